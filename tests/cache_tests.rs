// Result cache tests - testing only public APIs
// Author: kelexine (https://github.com/kelexine)

use async_trait::async_trait;
use markpilot::cache::{CacheKey, CacheStats, ResultCache};
use markpilot::client::{ApiClient, ChatRequest, ChatResult, CompletionRequest, CompletionResult};
use markpilot::config::{Settings, SettingsView};
use markpilot::error::ApiError;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn request(model: &str, language: &str, prefix: &str, suffix: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        language: language.to_string(),
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
        max_tokens: 64,
        temperature: 0.0,
    }
}

#[derive(Default)]
struct CountingClient {
    calls: AtomicUsize,
}

#[async_trait]
impl ApiClient for CountingClient {
    async fn fetch_completions(&self, request: &CompletionRequest) -> Result<CompletionResult, ApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResult {
            text: format!("{} #{}", request.prefix, n),
            model: request.model.clone(),
            usage: None,
        })
    }

    async fn fetch_chat_completion(&self, request: &ChatRequest) -> Result<ChatResult, ApiError> {
        Ok(ChatResult {
            content: String::new(),
            model: request.model.clone(),
            usage: None,
        })
    }
}

#[tokio::test]
async fn test_cache_stats_initialization() {
    let cache = ResultCache::new(
        Arc::new(CountingClient::default()),
        SettingsView::fixed(Settings::default()),
        None,
    );

    assert_eq!(cache.stats(), CacheStats::default());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_cached_result_is_returned_verbatim() {
    let inner = Arc::new(CountingClient::default());
    let cache = ResultCache::new(inner.clone(), SettingsView::fixed(Settings::default()), None);
    let req = request("gpt-4o-mini", "markdown", "Hello", " world");

    let first = cache.fetch_completions(&req).await.unwrap();
    let second = cache.fetch_completions(&req).await.unwrap();

    // A second provider call would have produced "#1"
    assert_eq!(first.text, "Hello #0");
    assert_eq!(second, first);
    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_empties_the_table() {
    let inner = Arc::new(CountingClient::default());
    let cache = ResultCache::new(inner.clone(), SettingsView::fixed(Settings::default()), None);

    cache.fetch_completions(&request("m", "md", "a", "")).await.unwrap();
    cache.fetch_completions(&request("m", "md", "b", "")).await.unwrap();
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());

    let again = cache.fetch_completions(&request("m", "md", "a", "")).await.unwrap();
    assert_eq!(again.text, "a #2");
}

#[test]
fn test_key_fields_are_length_prefixed() {
    let a = CacheKey::for_completion(&request("m", "md", "ab", "c"));
    let b = CacheKey::for_completion(&request("m", "md", "a", "bc"));
    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 64);
}

#[test]
fn test_key_ignores_sampling_settings() {
    let mut a = request("m", "md", "prefix", "suffix");
    let b = a.clone();
    a.max_tokens = 128;
    assert_eq!(CacheKey::for_completion(&a), CacheKey::for_completion(&b));
}

proptest! {
    #[test]
    fn prop_key_is_deterministic(
        model in "[a-z0-9.-]{1,16}",
        language in "[a-z]{0,8}",
        prefix in any::<String>(),
        suffix in any::<String>(),
    ) {
        let req = request(&model, &language, &prefix, &suffix);
        prop_assert_eq!(CacheKey::for_completion(&req), CacheKey::for_completion(&req.clone()));
    }

    #[test]
    fn prop_different_prefixes_give_different_keys(
        prefix in "[a-z ]{0,32}",
        other in "[a-z ]{0,32}",
    ) {
        prop_assume!(prefix != other);
        let a = CacheKey::for_completion(&request("m", "md", &prefix, ""));
        let b = CacheKey::for_completion(&request("m", "md", &other, ""));
        prop_assert_ne!(a, b);
    }
}
