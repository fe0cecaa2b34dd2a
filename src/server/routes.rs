// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{
    cache_clear_handler, cancel_completion_handler, chat_handler, chat_history_handler,
    clear_chat_history_handler, completion_handler, get_settings_handler, health_handler,
    metrics_handler, patch_settings_handler, usage_handler,
};
use super::middleware::{request_id_layers, track_metrics};
use super::sessions::SessionCoalescers;
use crate::cache::ResultCache;
use crate::client::{ApiClient, MeteredClient, OpenAiCompatibleClient};
use crate::config::{AppConfig, ProviderKind, Settings, SettingsStore};
use crate::error::Result;
use crate::ledger::{Clock, CostLedger, LocalClock};
use crate::notify::{NotificationLog, Notifier};
use crate::state::StateStore;
use axum::{routing::{get, post}, Router};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Request bodies carry document excerpts; anything larger is a client bug.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub settings: SettingsStore,
    /// Completion chain entry point; also exposes cache maintenance.
    pub cache: Arc<ResultCache>,
    pub chat_client: Arc<dyn ApiClient>,
    pub sessions: Arc<SessionCoalescers>,
    pub ledger: Arc<CostLedger>,
    pub state_store: Arc<StateStore>,
    pub notices: Arc<NotificationLog>,
}

impl AppState {
    /// Assemble the request chains from configuration, resuming persisted
    /// state from `config.state.path`.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(LocalClock))
    }

    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let notices = Arc::new(NotificationLog::default());
        let state_store = Arc::new(StateStore::open(&config.state.path, clock)?);
        let ledger = state_store.ledger();

        // Toggles changed at runtime take precedence over the config file.
        let settings = SettingsStore::new(
            state_store
                .settings()
                .unwrap_or_else(|| Settings::from_config(&config)),
        );

        let metered = |provider: ProviderKind| -> Result<Arc<dyn ApiClient>> {
            let adapter = OpenAiCompatibleClient::new(
                provider,
                &config.providers,
                notices.clone() as Arc<dyn Notifier>,
            )?;
            let store = state_store.clone();
            let client = MeteredClient::new(
                Arc::new(adapter),
                ledger.clone(),
                provider,
                settings.view(),
                notices.clone(),
            )
            .on_record(Arc::new(move |_cost: Decimal| {
                store.save_in_background();
            }));
            Ok(Arc::new(client))
        };

        let completion_client = metered(config.completions.provider)?;
        let chat_client = metered(config.chat.provider)?;

        let cache = Arc::new(ResultCache::new(
            completion_client,
            settings.view(),
            config.cache.max_entries,
        ));
        let sessions = Arc::new(SessionCoalescers::new(
            cache.clone(),
            Duration::from_millis(config.completions.wait_ms),
        ));

        info!(
            "Completions via {} ({}), chat via {} ({})",
            config.completions.provider,
            config.completions.model,
            config.chat.provider,
            config.chat.model
        );

        Ok(Self {
            config: Arc::new(config),
            settings,
            cache,
            chat_client,
            sessions,
            ledger,
            state_store,
            notices,
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let (set_request_id, propagate_request_id) = request_id_layers();

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/completions", post(completion_handler))
        .route("/v1/completions/cancel", post(cancel_completion_handler))
        .route("/v1/chat", post(chat_handler))
        .route(
            "/v1/chat/history",
            get(chat_history_handler).delete(clear_chat_history_handler),
        )
        .route("/v1/usage", get(usage_handler))
        .route("/v1/cache/clear", post(cache_clear_handler))
        .route(
            "/v1/settings",
            get(get_settings_handler).patch(patch_settings_handler),
        )
        .route_layer(axum::middleware::from_fn(track_metrics))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}
