// Usage metering decorator
// Author: kelexine (https://github.com/kelexine)

use super::{ApiClient, ChatRequest, ChatResult, CompletionRequest, CompletionResult, TokenUsage};
use crate::config::{ProviderKind, SettingsView};
use crate::error::ApiError;
use crate::ledger::{CostLedger, PricingTable};
use crate::metrics;
use crate::notify::Notifier;
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

/// Called with the incremental cost after each recorded call.
pub type RecordHook = Arc<dyn Fn(Decimal) + Send + Sync>;

/// Records the token usage of every successful call in a [`CostLedger`] and
/// refuses new calls once the monthly limit is reached.
///
/// Sits directly above the provider adapter, so results served by the
/// cache never reach it and are never billed twice.
pub struct MeteredClient {
    inner: Arc<dyn ApiClient>,
    ledger: Arc<CostLedger>,
    provider: ProviderKind,
    settings: SettingsView,
    notifier: Arc<dyn Notifier>,
    on_record: Option<RecordHook>,
}

impl MeteredClient {
    pub fn new(
        inner: Arc<dyn ApiClient>,
        ledger: Arc<CostLedger>,
        provider: ProviderKind,
        settings: SettingsView,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner,
            ledger,
            provider,
            settings,
            notifier,
            on_record: None,
        }
    }

    /// Run `hook` after each recorded call, e.g. to persist the ledger.
    pub fn on_record(mut self, hook: RecordHook) -> Self {
        self.on_record = Some(hook);
        self
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    fn check_budget(&self) -> Result<(), ApiError> {
        let Some(limit) = self.settings.monthly_limit_usd().and_then(Decimal::from_f64) else {
            return Ok(());
        };

        let spent = self.ledger.total_for_this_month();
        if spent >= limit {
            let error = ApiError::BudgetExceeded { spent, limit };
            warn!(%spent, %limit, "Refusing request over monthly limit");
            self.notifier.notify(&error.to_string());
            return Err(error);
        }
        Ok(())
    }

    fn record(&self, model: &str, usage: Option<TokenUsage>) {
        let Some(usage) = usage else {
            debug!("Provider reported no usage for {}", model);
            return;
        };

        let pricing = PricingTable::for_model(self.provider, model);
        let cost = self.ledger.record(usage, &pricing);
        metrics::record_usage(self.provider.as_str(), model, &usage, cost);

        if let Some(hook) = &self.on_record {
            hook(cost);
        }
    }
}

#[async_trait]
impl ApiClient for MeteredClient {
    async fn fetch_completions(&self, request: &CompletionRequest) -> Result<CompletionResult, ApiError> {
        self.check_budget()?;
        let result = self.inner.fetch_completions(request).await?;
        self.record(&request.model, result.usage);
        Ok(result)
    }

    async fn fetch_chat_completion(&self, request: &ChatRequest) -> Result<ChatResult, ApiError> {
        self.check_budget()?;
        let result = self.inner.fetch_chat_completion(request).await?;
        self.record(&request.model, result.usage);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::ProviderError;
    use crate::ledger::FixedClock;
    use crate::notify::NotificationLog;
    use chrono::NaiveDate;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockClient {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockClient {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ApiClient for MockClient {
        async fn fetch_completions(&self, request: &CompletionRequest) -> Result<CompletionResult, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Unavailable("down".into()).into());
            }
            Ok(CompletionResult {
                text: "brown fox".into(),
                model: request.model.clone(),
                usage: Some(TokenUsage::new(1000, 1000)),
            })
        }

        async fn fetch_chat_completion(&self, request: &ChatRequest) -> Result<ChatResult, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResult {
                content: "hello".into(),
                model: request.model.clone(),
                usage: Some(TokenUsage::new(500, 500)),
            })
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-3.5-turbo".into(),
            language: "markdown".into(),
            prefix: "The quick ".into(),
            suffix: String::new(),
            max_tokens: 64,
            temperature: 0.0,
        }
    }

    fn ledger() -> Arc<CostLedger> {
        let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()));
        Arc::new(CostLedger::new(clock))
    }

    fn settings(limit: Option<f64>) -> SettingsView {
        SettingsView::fixed(Settings {
            monthly_limit_usd: limit,
            ..Settings::default()
        })
    }

    #[tokio::test]
    async fn test_records_successful_calls() {
        let inner = MockClient::new(false);
        let ledger = ledger();
        let client = MeteredClient::new(
            inner.clone(),
            ledger.clone(),
            ProviderKind::OpenAi,
            settings(None),
            Arc::new(NotificationLog::default()),
        );

        client.fetch_completions(&request()).await.unwrap();

        // gpt-3.5-turbo: 0.0005 prompt + 0.0015 completion per 1K tokens
        assert_eq!(ledger.total_for_today(), Decimal::from_str("0.002").unwrap());
        assert_eq!(ledger.usage_for_today().unwrap().prompt_tokens, 1000);
    }

    #[tokio::test]
    async fn test_failures_are_not_recorded() {
        let ledger = ledger();
        let client = MeteredClient::new(
            MockClient::new(true),
            ledger.clone(),
            ProviderKind::OpenAi,
            settings(None),
            Arc::new(NotificationLog::default()),
        );

        assert!(client.fetch_completions(&request()).await.is_err());
        assert!(ledger.usage_for_today().is_none());
    }

    #[tokio::test]
    async fn test_refuses_calls_over_monthly_limit() {
        let inner = MockClient::new(false);
        let ledger = ledger();
        let notices = Arc::new(NotificationLog::default());
        let client = MeteredClient::new(
            inner.clone(),
            ledger.clone(),
            ProviderKind::OpenAi,
            settings(Some(0.001)),
            notices.clone(),
        );

        // First call is allowed, it pushes spending past the limit.
        client.fetch_completions(&request()).await.unwrap();
        let err = client.fetch_completions(&request()).await.unwrap_err();

        assert!(matches!(err, ApiError::BudgetExceeded { .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(notices.recent().len(), 1);
    }

    #[tokio::test]
    async fn test_record_hook_receives_cost() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let client = MeteredClient::new(
            MockClient::new(false),
            ledger(),
            ProviderKind::Ollama,
            settings(None),
            Arc::new(NotificationLog::default()),
        )
        .on_record(Arc::new(move |cost: Decimal| sink.lock().push(cost)));

        let chat = ChatRequest {
            model: "llama3".into(),
            messages: vec![super::super::ChatMessage::user("hi")],
            max_tokens: 32,
            temperature: 0.5,
        };
        client.fetch_chat_completion(&chat).await.unwrap();

        assert_eq!(*seen.lock(), vec![Decimal::ZERO]);
    }
}
