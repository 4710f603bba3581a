//! Error taxonomy for the remote client.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by remote operations.
///
/// The client performs no retries itself; callers decide what is fatal,
/// what adjusts pacing, and what is an idempotent success.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad credentials or expired session. Fatal to the worker.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Handle does not resolve to an account. Target is skipped.
    #[error("profile not found: {0}")]
    NotFound(String),

    /// The remote service rejected the request for pacing reasons.
    #[error("rate limited by service: {message}")]
    RateLimited {
        message: String,
        /// Seconds from a Retry-After header, when present.
        retry_after: Option<u64>,
    },

    /// The relationship already exists; treated as success upstream.
    #[error("already following: {0}")]
    AlreadyFollowing(String),

    /// Transport-level failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Anything the service returned that fits no other bucket.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Error body returned by XRPC endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct XrpcErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Classify an error response from status code and XRPC body.
pub fn classify_error(
    status: StatusCode,
    body: &XrpcErrorBody,
    retry_after: Option<u64>,
) -> ClientError {
    let error = body.error.as_deref().unwrap_or_default();
    let message = body.message.as_deref().unwrap_or_default();
    let detail = if message.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        message.to_string()
    };

    if status == StatusCode::TOO_MANY_REQUESTS
        || error == "RateLimitExceeded"
        || message.contains("Rate Limit")
    {
        return ClientError::RateLimited {
            message: detail,
            retry_after,
        };
    }
    if status == StatusCode::UNAUTHORIZED || error == "AuthenticationRequired" {
        return ClientError::Auth(detail);
    }
    if error.contains("NotFound") || message.contains("Profile not found") {
        return ClientError::NotFound(detail);
    }
    if message.contains("already following") {
        return ClientError::AlreadyFollowing(detail);
    }
    ClientError::Unexpected(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(error: &str, message: &str) -> XrpcErrorBody {
        XrpcErrorBody {
            error: Some(error.to_string()),
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn test_401_is_auth() {
        let err = classify_error(
            StatusCode::UNAUTHORIZED,
            &body("AuthenticationRequired", "Invalid identifier or password"),
            None,
        );
        assert!(matches!(err, ClientError::Auth(_)));
    }

    #[test]
    fn test_429_is_rate_limited_with_retry_after() {
        let err = classify_error(
            StatusCode::TOO_MANY_REQUESTS,
            &body("RateLimitExceeded", "Rate Limit Exceeded"),
            Some(30),
        );
        match err {
            ClientError::RateLimited { retry_after, .. } => assert_eq!(retry_after, Some(30)),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn test_rate_limit_detected_from_message() {
        // Some proxies return 400 with a rate limit message
        let err = classify_error(
            StatusCode::BAD_REQUEST,
            &body("InvalidRequest", "Rate Limit Exceeded"),
            None,
        );
        assert!(matches!(err, ClientError::RateLimited { .. }));
    }

    #[test]
    fn test_unknown_actor_is_not_found() {
        let err = classify_error(
            StatusCode::BAD_REQUEST,
            &body("InvalidRequest", "Profile not found"),
            None,
        );
        assert!(matches!(err, ClientError::NotFound(_)));

        let err = classify_error(StatusCode::BAD_REQUEST, &body("ActorNotFound", ""), None);
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_relationship() {
        let err = classify_error(
            StatusCode::BAD_REQUEST,
            &body("InvalidRequest", "already following this account"),
            None,
        );
        assert!(matches!(err, ClientError::AlreadyFollowing(_)));
    }

    #[test]
    fn test_fallback_is_unexpected() {
        let err = classify_error(StatusCode::INTERNAL_SERVER_ERROR, &body("", ""), None);
        match err {
            ClientError::Unexpected(msg) => assert_eq!(msg, "HTTP 500"),
            other => panic!("expected unexpected, got {other:?}"),
        }
    }
}
