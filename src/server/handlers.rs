// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::client::{validate_api_key, ApiClient, ChatMessage, ChatRequest, CompletionRequest, TokenUsage};
use crate::config::{ProviderKind, Settings, SettingsPatch};
use crate::error::{PilotError, Result};
use crate::ledger::UsageRecord;
use crate::notify::Notice;
use crate::{metrics, prompt};
use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse, Json};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub notices: Vec<Notice>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

impl HealthCheck {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

fn credential_check(state: &AppState, kind: ProviderKind) -> HealthCheck {
    let credentials = state.config.providers.credentials(kind);
    match validate_api_key(kind, credentials.api_key.as_deref()) {
        Ok(_) => HealthCheck::ok(format!("{} key accepted", kind.display_name())),
        Err(e) => HealthCheck::error(e.to_string()),
    }
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;
    let settings = state.settings.current();

    // A feature without a usable key cannot work at all.
    for (feature, enabled, kind) in [
        ("completions_provider", settings.completions_enabled, state.config.completions.provider),
        ("chat_provider", settings.chat_enabled, state.config.chat.provider),
    ] {
        let check = credential_check(&state, kind);
        if enabled && check.status != "ok" {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.insert(feature.to_string(), check);
    }

    let month = state.ledger.total_for_this_month();
    let usage_check = match settings.monthly_limit_usd.and_then(Decimal::from_f64) {
        Some(limit) if month >= limit => {
            if overall_status == HealthStatus::Healthy {
                overall_status = HealthStatus::Degraded;
            }
            HealthCheck {
                status: "warning".to_string(),
                message: format!("Monthly limit reached: ${} of ${}", month, limit),
            }
        }
        Some(limit) => HealthCheck::ok(format!("${} of ${} spent this month", month, limit)),
        None => HealthCheck::ok(format!("${} spent this month, no limit", month)),
    };
    checks.insert("usage".to_string(), usage_check);

    Json(HealthResponse {
        status: overall_status,
        checks,
        notices: state.notices.recent(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

fn default_session() -> String {
    "default".to_string()
}

/// A completion intent: the document around the cursor.
#[derive(Debug, Deserialize)]
pub struct CompletionBody {
    /// Keystrokes within one session supersede each other.
    #[serde(default = "default_session")]
    pub session: String,
    #[serde(default)]
    pub language: String,
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    /// Skip the wait and run immediately.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CompletionResponse {
    Ok {
        id: String,
        text: String,
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// A newer request from the same session replaced this one.
    Superseded,
}

pub async fn completion_handler(
    State(state): State<AppState>,
    Json(body): Json<CompletionBody>,
) -> Result<Json<CompletionResponse>> {
    if !state.settings.current().completions_enabled {
        return Err(PilotError::FeatureDisabled("completions are disabled".to_string()));
    }

    let config = &state.config.completions;
    let (prefix, suffix) = prompt::truncate_context(&body.prefix, &body.suffix, config.window_size);
    let request = CompletionRequest {
        model: body.model.unwrap_or_else(|| config.model.clone()),
        language: body.language,
        prefix,
        suffix,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    };

    let coalescer = state.sessions.get(&body.session);
    let pending = coalescer.debounced(request);
    if body.force {
        coalescer.force();
    }

    match pending.await {
        None => {
            debug!("Completion for session {} superseded", body.session);
            Ok(Json(CompletionResponse::Superseded))
        }
        Some(Ok(result)) => Ok(Json(CompletionResponse::Ok {
            id: format!("cmpl_{}", uuid::Uuid::new_v4().simple()),
            text: result.text,
            model: result.model,
            usage: result.usage,
        })),
        Some(Err(e)) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    #[serde(default = "default_session")]
    pub session: String,
}

pub async fn cancel_completion_handler(
    State(state): State<AppState>,
    Json(body): Json<CancelBody>,
) -> Json<serde_json::Value> {
    let cancelled = state.sessions.cancel(&body.session);
    Json(serde_json::json!({ "cancelled": cancelled }))
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>> {
    if !state.settings.current().chat_enabled {
        return Err(PilotError::FeatureDisabled("chat is disabled".to_string()));
    }
    if body.messages.is_empty() {
        return Err(PilotError::InvalidRequest("messages must not be empty".to_string()));
    }

    let config = &state.config.chat;
    let request = ChatRequest {
        model: body.model.unwrap_or_else(|| config.model.clone()),
        messages: body.messages,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    };

    info!(
        "Received chat request: model={}, messages={}",
        request.model,
        request.messages.len()
    );
    let result = state.chat_client.fetch_chat_completion(&request).await?;

    let store = state.state_store.clone();
    let response = result.content.clone();
    match tokio::task::spawn_blocking(move || store.record_chat(request.messages, response)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to persist chat history: {}", e),
        Err(e) => warn!("Chat history writer failed: {}", e),
    }

    Ok(Json(ChatResponse {
        id: format!("chat_{}", uuid::Uuid::new_v4().simple()),
        content: result.content,
        model: result.model,
        usage: result.usage,
    }))
}

pub async fn chat_history_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.state_store.chat_history())
}

pub async fn clear_chat_history_handler(State(state): State<AppState>) -> Result<StatusCode> {
    let store = state.state_store.clone();
    tokio::task::spawn_blocking(move || store.clear_chat_history())
        .await
        .map_err(|e| PilotError::Internal(format!("Chat history writer failed: {}", e)))??;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageResponse {
    pub today: Option<UsageRecord>,
    pub today_usd: Decimal,
    pub month_usd: Decimal,
    pub monthly_limit_usd: Option<Decimal>,
    pub remaining_usd: Option<Decimal>,
}

pub async fn usage_handler(State(state): State<AppState>) -> Json<UsageResponse> {
    let month_usd = state.ledger.total_for_this_month();
    let limit = state
        .settings
        .current()
        .monthly_limit_usd
        .and_then(Decimal::from_f64);

    Json(UsageResponse {
        today: state.ledger.usage_for_today(),
        today_usd: state.ledger.total_for_today(),
        month_usd,
        monthly_limit_usd: limit,
        remaining_usd: limit.map(|limit| (limit - month_usd).max(Decimal::ZERO)),
    })
}

pub async fn cache_clear_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.cache.len();
    state.cache.clear();
    Json(serde_json::json!({ "cleared": cleared }))
}

pub async fn get_settings_handler(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.current())
}

pub async fn patch_settings_handler(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Json<Settings> {
    let updated = state.settings.apply(patch);
    if !updated.completions_enabled {
        state.sessions.cancel_all();
    }

    let store = state.state_store.clone();
    let snapshot = updated.clone();
    match tokio::task::spawn_blocking(move || store.record_settings(snapshot)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to persist settings: {}", e),
        Err(e) => warn!("Settings writer failed: {}", e),
    }
    Json(updated)
}
