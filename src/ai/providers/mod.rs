//! LLM Provider Implementations
//!
//! Concrete backends behind the `LlmProvider` trait, plus the shared HTTP
//! client construction, retry loop, and error classification they all use.

mod anthropic;
mod groq;
mod openai;

pub use anthropic::AnthropicProvider;
pub use groq::GroqProvider;
pub use openai::OpenAiProvider;

use std::future::Future;
use std::time::Duration;

use crate::ai::{AiError, Result};

/// Retry policy shared by all backends: up to 3 attempts, exponential
/// backoff starting at 2 seconds, capped at 10 seconds.
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 2;
const BACKOFF_CAP_SECS: u64 = 10;

/// Build a reqwest client with timeout settings.
pub(crate) fn build_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(AiError::Network)
}

/// Run `op` with the shared retry policy. Only transient failures are
/// retried; quota and auth errors return immediately.
pub(crate) async fn with_retry<T, F, Fut>(operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Duration::from_secs(BACKOFF_BASE_SECS);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    operation,
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    error = %err,
                    "transient provider failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(BACKOFF_CAP_SECS));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Map a non-success provider response to the error taxonomy.
///
/// Quota exhaustion arrives as a 429 whose body mentions quota/billing; it
/// must map to `QuotaExceeded` so the caller sees a payment-class error
/// rather than a plain rate limit.
pub(crate) async fn classify_error_response(response: reqwest::Response) -> AiError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    let lowered = body.to_ascii_lowercase();

    match status.as_u16() {
        429 => {
            if lowered.contains("quota")
                || lowered.contains("insufficient_quota")
                || lowered.contains("billing")
            {
                AiError::QuotaExceeded(body)
            } else {
                AiError::RateLimited(body)
            }
        }
        401 | 403 => AiError::Authentication(body),
        _ if lowered.contains("invalid_api_key") => AiError::Authentication(body),
        status_code => AiError::Provider {
            status: status_code,
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AiError::RateLimited("busy".into())) }
        })
        .await;

        assert!(matches!(result, Err(AiError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_terminal_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AiError::QuotaExceeded("billing".into())) }
        })
        .await;

        assert!(matches!(result, Err(AiError::QuotaExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AiError::Provider {
                        status: 503,
                        message: "overloaded".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
