// Error handling tests
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::IntoResponse;
use markpilot::error::{ApiError, PilotError, ProviderError};
use rust_decimal::Decimal;

#[test]
fn test_error_display_messages() {
    let errors = vec![
        PilotError::from(ApiError::Configuration("OpenAI API key is not set.".to_string())),
        PilotError::from(ApiError::from(ProviderError::Auth("bad key".to_string()))),
        PilotError::from(ApiError::from(ProviderError::RateLimited("slow".to_string()))),
        PilotError::FeatureDisabled("chat is disabled".to_string()),
        PilotError::InvalidRequest("Bad request".to_string()),
        PilotError::State("disk full".to_string()),
    ];

    for error in errors {
        let display = format!("{}", error);
        assert!(!display.is_empty(), "Error should have display message");
    }
}

#[test]
fn test_configuration_error_keeps_user_message() {
    let error = ApiError::Configuration("OpenRouter API key is invalid.".to_string());
    assert!(error.to_string().contains("OpenRouter API key is invalid."));
}

#[test]
fn test_budget_error_mentions_amounts() {
    let error = ApiError::BudgetExceeded {
        spent: Decimal::new(1050, 2),
        limit: Decimal::new(10, 0),
    };
    let message = error.to_string();
    assert!(message.contains("10.50"));
    assert!(message.contains("$10"));
}

#[test]
fn test_status_codes() {
    let cases = [
        (PilotError::from(ApiError::Configuration(String::new())), StatusCode::PRECONDITION_FAILED),
        (
            PilotError::from(ApiError::BudgetExceeded {
                spent: Decimal::ONE,
                limit: Decimal::ONE,
            }),
            StatusCode::PAYMENT_REQUIRED,
        ),
        (PilotError::FeatureDisabled(String::new()), StatusCode::FORBIDDEN),
        (PilotError::InvalidRequest(String::new()), StatusCode::BAD_REQUEST),
        (PilotError::Internal(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
        (
            PilotError::from(ApiError::from(ProviderError::MalformedResponse(String::new()))),
            StatusCode::BAD_GATEWAY,
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(error.classify().0, expected, "{}", error);
    }
}

#[tokio::test]
async fn test_error_response_body_shape() {
    let response = PilotError::FeatureDisabled("completions are disabled".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "feature_disabled");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("completions are disabled"));
}
