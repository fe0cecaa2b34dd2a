//! Cache keys, entries and statistics.

// Author: kelexine (https://github.com/kelexine)

use crate::client::CompletionRequest;
use crate::client::CompletionResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 fingerprint (hex) of the inputs that identify a completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprint of `(model, language, prefix, suffix)`.
    ///
    /// Every field is length-prefixed, so `("ab", "c")` and `("a", "bc")`
    /// never produce the same key.
    pub fn for_completion(request: &CompletionRequest) -> Self {
        let mut hasher = Sha256::new();
        for field in [
            request.model.as_str(),
            request.language.as_str(),
            request.prefix.as_str(),
            request.suffix.as_str(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex digits, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored completion. Never mutated after insertion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: CompletionResult,
    pub created_at: DateTime<Utc>,
}

/// Statistics for cache operations.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of lookups answered from a stored entry.
    pub hits: u64,
    /// Number of lookups that started a provider call.
    pub misses: u64,
    /// Number of lookups that joined a call already in flight.
    pub joins: u64,
    /// Number of results stored.
    pub stores: u64,
}
