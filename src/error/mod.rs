// Error types for markpilot
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

/// Failures reported by a language-model provider.
///
/// Cloneable so a single in-flight result can be handed to every caller
/// waiting on the same request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Errors surfaced through the `ApiClient` capability.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Missing or malformed credential; raised before any network access.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Monthly usage limit reached (${spent} of ${limit})")]
    BudgetExceeded { spent: Decimal, limit: Decimal },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Error, Debug)]
pub enum PilotError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("State persistence error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PilotError {
    /// HTTP status and error type reported to editor clients.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            PilotError::Api(ApiError::Configuration(_)) => {
                (StatusCode::PRECONDITION_FAILED, "configuration_error")
            }
            PilotError::Api(ApiError::BudgetExceeded { .. }) => {
                (StatusCode::PAYMENT_REQUIRED, "budget_exceeded_error")
            }
            PilotError::Api(ApiError::Provider(provider)) => match provider {
                ProviderError::Auth(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
                ProviderError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
                ProviderError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "overloaded_error"),
                ProviderError::Rejected(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
                ProviderError::Network(_) | ProviderError::MalformedResponse(_) => {
                    (StatusCode::BAD_GATEWAY, "api_error")
                }
            },
            PilotError::FeatureDisabled(_) => (StatusCode::FORBIDDEN, "feature_disabled"),
            PilotError::InvalidRequest(_) | PilotError::Json(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error")
            }
            PilotError::Config(_) | PilotError::ConfigParsing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            PilotError::State(_) | PilotError::Io(_) | PilotError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "api_error")
            }
        }
    }
}

// Convert PilotError to HTTP responses for Axum
impl IntoResponse for PilotError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();

        let body = json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_map_to_distinct_statuses() {
        let cases = [
            (ProviderError::Auth("bad key".into()), StatusCode::UNAUTHORIZED),
            (ProviderError::RateLimited("slow down".into()), StatusCode::TOO_MANY_REQUESTS),
            (ProviderError::Unavailable("503".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ProviderError::Network("reset".into()), StatusCode::BAD_GATEWAY),
        ];

        for (error, expected) in cases {
            let (status, _) = PilotError::from(ApiError::from(error)).classify();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_provider_error_display_is_untouched_through_api_error() {
        let provider = ProviderError::MalformedResponse("missing choices".into());
        let api: ApiError = provider.clone().into();
        assert_eq!(api.to_string(), provider.to_string());
    }
}
