// Result cache - memoizes completions with single-flight de-duplication
// Author: kelexine (https://github.com/kelexine)

use crate::cache::models::{CacheEntry, CacheKey, CacheStats};
use crate::client::{ApiClient, ChatRequest, ChatResult, CompletionRequest, CompletionResult};
use crate::config::SettingsView;
use crate::error::ApiError;
use crate::metrics;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

type SharedFetch = Shared<BoxFuture<'static, Result<CompletionResult, ApiError>>>;

/// Provisional slot holding the call itself; every caller for the key awaits
/// a clone, and whichever drives it to completion settles the slot.
struct InFlight {
    ticket: u64,
    fetch: SharedFetch,
}

/// Stored results are subject to the LRU cap. Calls in flight are kept apart
/// and never evicted, so a capped cache still shares every pending call.
struct Table {
    ready: LruCache<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
    next_ticket: u64,
    stats: CacheStats,
}

enum Lookup {
    Hit(CompletionResult),
    Join(SharedFetch),
    Miss,
}

/// Memoizes completion results in front of any [`ApiClient`].
///
/// Identical requests are answered from memory without delegating, and
/// concurrent identical requests share one provider call. Failures are never
/// stored. Whether caching is on is read from the live settings on every
/// call; turning it off bypasses the table without clearing it.
pub struct ResultCache {
    inner: Arc<dyn ApiClient>,
    settings: SettingsView,
    table: Arc<Mutex<Table>>,
}

impl ResultCache {
    /// Wrap `inner`. With `max_entries` set, least recently used results are
    /// evicted past that size; otherwise the table grows until cleared.
    pub fn new(inner: Arc<dyn ApiClient>, settings: SettingsView, max_entries: Option<usize>) -> Self {
        let ready = match max_entries.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        Self {
            inner,
            settings,
            table: Arc::new(Mutex::new(Table {
                ready,
                in_flight: HashMap::new(),
                next_ticket: 0,
                stats: CacheStats::default(),
            })),
        }
    }

    /// Number of stored results. Calls still in flight are not counted.
    pub fn len(&self) -> usize {
        self.table.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.table.lock().stats.clone()
    }

    /// Empty the table. Calls in flight still answer their callers but do
    /// not store their results.
    pub fn clear(&self) {
        let removed = {
            let mut table = self.table.lock();
            let removed = table.ready.len() + table.in_flight.len();
            table.ready.clear();
            table.in_flight.clear();
            removed
        };
        metrics::record_cache_clear();
        metrics::update_cache_entries(0);
        debug!("Result cache cleared ({} slots)", removed);
    }

    fn start_fetch(&self, key: CacheKey, ticket: u64, request: CompletionRequest) -> SharedFetch {
        let inner = self.inner.clone();
        let table = self.table.clone();

        async move {
            let result = inner.fetch_completions(&request).await;
            settle(&table, key, ticket, &result);
            result
        }
        .boxed()
        .shared()
    }
}

/// Resolve a provisional slot, unless it was cleared or replaced meanwhile.
fn settle(
    table: &Mutex<Table>,
    key: CacheKey,
    ticket: u64,
    result: &Result<CompletionResult, ApiError>,
) {
    let mut table = table.lock();
    let current = matches!(table.in_flight.get(&key), Some(slot) if slot.ticket == ticket);
    if !current {
        debug!("Discarding result for {}: slot no longer current", key.short());
        return;
    }
    table.in_flight.remove(&key);

    match result {
        Ok(value) => {
            debug!("Storing result for {}", key.short());
            table.ready.put(
                key.clone(),
                CacheEntry {
                    key,
                    value: value.clone(),
                    created_at: Utc::now(),
                },
            );
            table.stats.stores += 1;
            metrics::record_cache_store();
        }
        Err(e) => {
            debug!("Not caching failure for {}: {}", key.short(), e);
        }
    }
    metrics::update_cache_entries(table.ready.len());
}

#[async_trait]
impl ApiClient for ResultCache {
    async fn fetch_completions(&self, request: &CompletionRequest) -> Result<CompletionResult, ApiError> {
        if !self.settings.cache_enabled() {
            metrics::record_cache_bypass();
            return self.inner.fetch_completions(request).await;
        }

        let key = CacheKey::for_completion(request);

        let fetch = {
            let mut table = self.table.lock();
            let lookup = if let Some(entry) = table.ready.get(&key) {
                Lookup::Hit(entry.value.clone())
            } else if let Some(slot) = table.in_flight.get(&key) {
                Lookup::Join(slot.fetch.clone())
            } else {
                Lookup::Miss
            };

            match lookup {
                Lookup::Hit(value) => {
                    table.stats.hits += 1;
                    metrics::record_cache_hit();
                    debug!("Cache hit: {}", key.short());
                    return Ok(value);
                }
                Lookup::Join(fetch) => {
                    table.stats.joins += 1;
                    metrics::record_cache_join();
                    debug!("Joining in-flight call: {}", key.short());
                    fetch
                }
                Lookup::Miss => {
                    table.stats.misses += 1;
                    metrics::record_cache_miss();
                    debug!("Cache miss: {}", key.short());

                    table.next_ticket += 1;
                    let ticket = table.next_ticket;
                    let fetch = self.start_fetch(key.clone(), ticket, request.clone());
                    table.in_flight.insert(
                        key,
                        InFlight {
                            ticket,
                            fetch: fetch.clone(),
                        },
                    );
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Chat turns are conversational and expected to vary; never cached.
    async fn fetch_chat_completion(&self, request: &ChatRequest) -> Result<ChatResult, ApiError> {
        self.inner.fetch_chat_completion(request).await
    }
}
