//! API error responses
//!
//! Maps the module error taxonomies onto HTTP statuses and a uniform
//! `{error, message, operation}` JSON payload. Quota exhaustion is payment
//! required, distinct from rate limiting and from auth failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::ai::AiError;
use crate::memory::MemoryError;
use crate::sessions::SessionError;
use crate::speech::SpeechError;

/// An error ready to leave the service. `operation` labels the stage that
/// failed so clients can tell transcription apart from generation.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
    pub operation: &'static str,
}

impl ApiError {
    pub fn from_ai(err: AiError, operation: &'static str) -> Self {
        let (status, error) = match &err {
            AiError::QuotaExceeded(_) => (StatusCode::PAYMENT_REQUIRED, "quota_exceeded"),
            AiError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AiError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_failed"),
            AiError::MissingApiKey { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "provider_not_configured")
            }
            AiError::Provider { .. }
            | AiError::Network(_)
            | AiError::MalformedResponse(_)
            | AiError::InvalidJson(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        };
        Self {
            status,
            error,
            message: err.to_string(),
            operation,
        }
    }

    pub fn from_speech(err: SpeechError, operation: &'static str) -> Self {
        match err {
            SpeechError::Provider(inner) => Self::from_ai(inner, operation),
            SpeechError::InvalidAudio(message) => Self {
                status: StatusCode::BAD_REQUEST,
                error: "invalid_audio",
                message,
                operation,
            },
        }
    }

    pub fn from_session(err: SessionError, operation: &'static str) -> Self {
        match err {
            SessionError::NotFound(id) => Self {
                status: StatusCode::NOT_FOUND,
                error: "session_not_found",
                message: format!("Session not found: {id}"),
                operation,
            },
            SessionError::Ended(id) => Self {
                status: StatusCode::BAD_REQUEST,
                error: "session_ended",
                message: format!("Session has ended: {id}"),
                operation,
            },
        }
    }

    pub fn from_memory(err: MemoryError, operation: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "storage_error",
            message: err.to_string(),
            operation,
        }
    }

    pub fn bad_request(message: impl Into<String>, operation: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "bad_request",
            message: message.into(),
            operation,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error,
            "message": self.message,
            "operation": self.operation,
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_maps_to_payment_required() {
        let err = ApiError::from_ai(
            AiError::QuotaExceeded("insufficient_quota".into()),
            "coach response generation",
        );
        assert_eq!(err.status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.error, "quota_exceeded");
    }

    #[test]
    fn test_rate_limit_and_auth_are_distinct() {
        let rate = ApiError::from_ai(AiError::RateLimited("slow down".into()), "x");
        let auth = ApiError::from_ai(AiError::Authentication("bad key".into()), "x");
        assert_eq!(rate.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(auth.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let err = ApiError::from_session(SessionError::NotFound("s-1".into()), "session lookup");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_ended_session_is_bad_request() {
        let err = ApiError::from_session(SessionError::Ended("s-1".into()), "session turn");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
