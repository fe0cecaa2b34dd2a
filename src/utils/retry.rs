// Retry logic with Retry-After hint support
// Author: kelexine (https://github.com/kelexine)

use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tracing::debug;

/// Status used for failures that never produced an HTTP response.
pub const TRANSPORT_FAILURE: u16 = 0;

/// A failed HTTP attempt.
#[derive(Debug, Clone)]
pub struct HttpFailure {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl HttpFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: TRANSPORT_FAILURE,
            body: message.into(),
            retry_after: None,
        }
    }
}

/// Parse a `Retry-After` header value given in seconds ("40", "1.5").
/// Returns the delay capped at 60 seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().trim_end_matches('s').parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let capped_seconds = seconds.min(60.0);
    Some(Duration::from_millis((capped_seconds * 1000.0) as u64))
}

/// Create exponential backoff configuration for retries
pub fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(500),
        initial_interval: Duration::from_millis(500),
        randomization_factor: 0.3,
        multiplier: 2.0,
        max_interval: Duration::from_secs(10),
        max_elapsed_time: Some(Duration::from_secs(60)),
        ..Default::default()
    }
}

/// Determine if an HTTP status code is retryable
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Execute operation, retrying rate-limited and unavailable responses.
/// - Uses the server's Retry-After hint if available
/// - Falls back to exponential backoff
/// - Gives up after `max_retries` retries
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    max_retries: u32,
    mut operation: F,
) -> Result<T, HttpFailure>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, HttpFailure>>,
{
    let mut backoff = create_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(failure) => {
                if !is_retryable(failure.status) || attempt > max_retries {
                    return Err(failure);
                }

                let delay = match failure.retry_after {
                    Some(hint) => hint,
                    None => match backoff.next_backoff() {
                        Some(delay) => delay,
                        None => return Err(failure),
                    },
                };
                debug!(
                    "{} failed with {} (attempt {}), retrying after {}ms",
                    operation_name,
                    failure.status,
                    attempt,
                    delay.as_millis()
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("40").unwrap().as_secs(), 40);
        assert_eq!(parse_retry_after("1.5").unwrap().as_millis(), 1500);
        assert_eq!(parse_retry_after("0.123s").unwrap().as_millis(), 123);
        assert_eq!(parse_retry_after("120").unwrap().as_secs(), 60);
        assert!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT").is_none());
        assert!(parse_retry_after("-3").is_none());
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(429));
        assert!(is_retryable(500));
        assert!(is_retryable(503));
        assert!(!is_retryable(400));
        assert!(!is_retryable(401));
        assert!(!is_retryable(TRANSPORT_FAILURE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<(), _> = with_retry("test", 2, || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(HttpFailure {
                status: 429,
                body: "slow down".into(),
                retry_after: Some(Duration::from_secs(1)),
            })
        })
        .await;

        assert_eq!(result.unwrap_err().status, 429);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<(), _> = with_retry("test", 5, || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(HttpFailure {
                status: 401,
                body: "no".into(),
                retry_after: None,
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
