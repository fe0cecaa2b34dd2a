// OpenAI-compatible provider adapter
// Author: kelexine (https://github.com/kelexine)

use super::credentials::validate_api_key;
use super::wire::{extract_error_message, ChatCompletionRequest, ChatCompletionResponse};
use super::{ApiClient, ChatMessage, ChatRequest, ChatResult, CompletionRequest, CompletionResult, TokenUsage};
use crate::config::{ProviderCredentials, ProviderKind, ProvidersConfig};
use crate::error::{ApiError, PilotError, ProviderError};
use crate::notify::Notifier;
use crate::utils::logging::sanitize;
use crate::utils::retry::{self, HttpFailure};
use crate::{metrics, prompt};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Client for any provider that speaks the OpenAI chat completions API.
///
/// The provider variant decides the default base URL and the shape the API
/// key must have. Keys are checked on every call so a missing key is reported
/// to the user before anything touches the network.
pub struct OpenAiCompatibleClient {
    kind: ProviderKind,
    http_client: Client,
    base_url: String,
    credentials: ProviderCredentials,
    max_retries: u32,
    notifier: Arc<dyn Notifier>,
}

/// Normalized answer of one chat completions call.
struct Answer {
    content: String,
    model: String,
    usage: Option<TokenUsage>,
}

impl OpenAiCompatibleClient {
    /// Create a client for `kind` from the provider section of the config.
    pub fn new(
        kind: ProviderKind,
        config: &ProvidersConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, PilotError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .build()
            .map_err(|e| PilotError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let credentials = config.credentials(kind);
        let base_url = credentials
            .base_url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_string());

        debug!("Created {} client for {}", kind, base_url);

        Ok(Self {
            kind,
            http_client,
            base_url,
            credentials: credentials.clone(),
            max_retries: config.max_retries,
            notifier,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call `{base_url}/chat/completions`, retrying 429 and 5xx responses.
    async fn chat_completions(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Answer, ApiError> {
        let api_key = match validate_api_key(self.kind, self.credentials.api_key.as_deref()) {
            Ok(key) => key,
            Err(ApiError::Configuration(message)) => {
                self.notifier.notify(&message);
                return Err(ApiError::Configuration(message));
            }
            Err(e) => return Err(e),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model,
            messages,
            max_tokens,
            temperature,
            n: 1,
        };

        debug!("Calling {} chat completions for model: {}", self.kind, model);
        let start = Instant::now();

        let http_client = &self.http_client;
        let (url, body, api_key) = (&url, &body, &api_key);

        let result = retry::with_retry("Chat Completion", self.max_retries, || async move {
            let mut request = http_client.post(url).json(body);
            if let Some(key) = api_key {
                request = request.bearer_auth(key.expose());
            }

            let response = request
                .send()
                .await
                .map_err(|e| HttpFailure::transport(format!("HTTP error: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(retry::parse_retry_after);
                let error_text = response.text().await.unwrap_or_default();
                return Err(HttpFailure {
                    status: status.as_u16(),
                    body: extract_error_message(&error_text).unwrap_or(error_text),
                    retry_after,
                });
            }

            response
                .text()
                .await
                .map_err(|e| HttpFailure::transport(format!("Failed to read response body: {}", e)))
        })
        .await;

        let elapsed = start.elapsed().as_secs_f64();
        let text = match result {
            Ok(text) => {
                metrics::record_provider_call(self.kind.as_str(), model, "success", elapsed);
                text
            }
            Err(failure) => {
                error!("{} API error: HTTP {} - {}", self.kind, failure.status, sanitize(&failure.body));
                let error = map_failure(failure);
                metrics::record_provider_call(self.kind.as_str(), model, error_label(&error), elapsed);
                return Err(error.into());
            }
        };

        let response: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse {} response: {}", self.kind, e);
            ProviderError::MalformedResponse(format!("Response parsing error: {}", e))
        })?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::MalformedResponse("Response contained no choices".to_string())
        })?;
        debug!("Finish reason: {:?}", choice.finish_reason);

        Ok(Answer {
            content: choice.message.content.unwrap_or_default(),
            model: response.model.unwrap_or_else(|| model.to_string()),
            usage: response.usage.map(TokenUsage::from),
        })
    }
}

/// Classify a final HTTP failure.
fn map_failure(failure: HttpFailure) -> ProviderError {
    let HttpFailure { status, body, .. } = failure;
    match status {
        retry::TRANSPORT_FAILURE => ProviderError::Network(body),
        401 | 403 => ProviderError::Auth(body),
        429 => ProviderError::RateLimited(body),
        500..=599 => ProviderError::Unavailable(format!("HTTP {}: {}", status, body)),
        _ => ProviderError::Rejected(format!("HTTP {}: {}", status, body)),
    }
}

fn error_label(error: &ProviderError) -> &'static str {
    match error {
        ProviderError::Auth(_) => "auth",
        ProviderError::RateLimited(_) => "rate_limited",
        ProviderError::Network(_) => "network",
        ProviderError::Unavailable(_) => "unavailable",
        ProviderError::Rejected(_) => "rejected",
        ProviderError::MalformedResponse(_) => "malformed",
    }
}

#[async_trait]
impl ApiClient for OpenAiCompatibleClient {
    async fn fetch_completions(&self, request: &CompletionRequest) -> Result<CompletionResult, ApiError> {
        let messages = prompt::completion_messages(request);
        let answer = self
            .chat_completions(&request.model, &messages, request.max_tokens, request.temperature)
            .await?;

        Ok(CompletionResult {
            text: prompt::clean_completion(&answer.content),
            model: answer.model,
            usage: answer.usage,
        })
    }

    async fn fetch_chat_completion(&self, request: &ChatRequest) -> Result<ChatResult, ApiError> {
        let messages = prompt::chat_messages(request);
        let answer = self
            .chat_completions(&request.model, &messages, request.max_tokens, request.temperature)
            .await?;

        Ok(ChatResult {
            content: answer.content,
            model: answer.model,
            usage: answer.usage,
        })
    }
}
