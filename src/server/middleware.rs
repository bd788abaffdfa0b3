//! Rate limiting middleware
//!
//! Per-user, per-endpoint counters in the cache. Identity comes from the
//! `X-User-ID` header (hashed to a numeric id; absent header counts as
//! "anonymous"). Health probes are exempt and a cache outage fails open.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::AppState;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Stable numeric id for a raw header value. Numeric ids pass through;
/// anything else is hashed.
pub(crate) fn numeric_user_id(raw: &str) -> i64 {
    if let Ok(id) = raw.parse::<i64>() {
        return id;
    }
    let digest = Sha256::digest(raw.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    fold_hash(bytes)
}

/// Fold eight digest bytes into a non-negative id. Masks the sign bit
/// instead of `abs()`, which overflows on an `i64::MIN` prefix.
fn fold_hash(bytes: [u8; 8]) -> i64 {
    i64::from_be_bytes(bytes) & i64::MAX
}

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !state.settings.rate_limit_enabled || path == "/" || path.starts_with("/health") {
        return next.run(request).await;
    }

    let raw_user = request
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous");
    let user_id = numeric_user_id(raw_user);

    match state.cache.check_rate_limit(user_id, &path).await {
        Ok(decision) if !decision.allowed => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded. Please try again later."
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(REMAINING_HEADER, HeaderValue::from_static("0"));
            response
        }
        Ok(decision) => {
            let mut response = next.run(request).await;
            if decision.remaining >= 0 {
                if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
                    response.headers_mut().insert(REMAINING_HEADER, value);
                }
            }
            response
        }
        Err(e) => {
            // Fail open: an unavailable cache must not take the API down.
            warn!(%path, error = %e, "rate limit check failed, allowing request");
            next.run(request).await
        }
    }
}
