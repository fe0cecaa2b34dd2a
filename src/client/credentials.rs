// API key handling
// Author: kelexine (https://github.com/kelexine)

use crate::config::ProviderKind;
use crate::error::ApiError;
use regex::Regex;
use std::sync::OnceLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A validated provider API key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Custom Debug impl that never logs keys
impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

fn openai_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^sk-[A-Za-z0-9_\-]+$").expect("Invalid regex pattern"))
}

fn openrouter_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^sk[A-Za-z0-9_\-]+$").expect("Invalid regex pattern"))
}

/// Checks the configured key for `kind`.
///
/// Returns `Ok(None)` for providers that need no key, and a
/// `Configuration` error whose message is suitable for showing to the user
/// when a required key is missing or has the wrong shape.
pub fn validate_api_key(kind: ProviderKind, key: Option<&str>) -> Result<Option<ApiKey>, ApiError> {
    let pattern = match kind {
        ProviderKind::OpenAi => openai_key_regex(),
        ProviderKind::OpenRouter => openrouter_key_regex(),
        ProviderKind::Ollama => return Ok(key.filter(|k| !k.is_empty()).map(|k| ApiKey(k.to_string()))),
    };

    let key = key.map(str::trim).filter(|k| !k.is_empty()).ok_or_else(|| {
        ApiError::Configuration(format!("{} API key is not set.", kind.display_name()))
    })?;

    if !pattern.is_match(key) {
        return Err(ApiError::Configuration(format!(
            "{} API key is invalid.",
            kind.display_name()
        )));
    }

    Ok(Some(ApiKey(key.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_impl_masks_key() {
        let key = validate_api_key(ProviderKind::OpenAi, Some("sk-secret123"))
            .unwrap()
            .unwrap();
        let debug_str = format!("{:?}", key);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret123"));
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = validate_api_key(ProviderKind::OpenRouter, None).unwrap_err();
        assert_eq!(
            err,
            ApiError::Configuration("OpenRouter API key is not set.".to_string())
        );

        let err = validate_api_key(ProviderKind::OpenAi, Some("  ")).unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[test]
    fn test_prefix_checks_per_provider() {
        assert!(validate_api_key(ProviderKind::OpenAi, Some("sk-abc_DEF-123")).is_ok());
        assert!(validate_api_key(ProviderKind::OpenAi, Some("pk-abc")).is_err());
        assert!(validate_api_key(ProviderKind::OpenAi, Some("skabc")).is_err());

        assert!(validate_api_key(ProviderKind::OpenRouter, Some("sk-or-v1-abc")).is_ok());
        assert!(validate_api_key(ProviderKind::OpenRouter, Some("or-v1-abc")).is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(validate_api_key(ProviderKind::Ollama, None).unwrap().is_none());
        assert!(validate_api_key(ProviderKind::Ollama, Some("anything")).unwrap().is_some());
    }
}
