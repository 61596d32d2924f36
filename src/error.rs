//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//!
//! # Taxonomy
//!
//! - **Unauthorized**: missing, malformed, or invalid credential (401)
//! - **Forbidden**: valid credential, insufficient tier (403)
//! - **RateLimited**: quota for the window exhausted (429)
//! - **LimitReached**: credential-issuance cap hit (409)
//! - **Internal**: shared store unreachable or any database failure (500)

use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use crate::{models::plan::Plan, services::rate_limit::RateDecision};

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code, a stable error code,
/// and a client-safe message. Internal details never reach the response.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (connection error, query error).
    ///
    /// Returns HTTP 500; the sqlx detail stays server-side.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Shared store unreachable where the tier policy is fail-closed.
    ///
    /// Returns HTTP 500.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// An Authorization header was present but is not a bearer token of
    /// the expected shape. Verification is never attempted.
    ///
    /// Returns HTTP 401.
    #[error("Malformed Authorization header")]
    MalformedAuthHeader,

    /// Credential is unknown, revoked, or the secret is wrong.
    ///
    /// One variant for all three so the response never reveals whether a
    /// presented token ever existed.
    ///
    /// Returns HTTP 401.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Valid credential, but the endpoint requires a higher tier.
    ///
    /// Returns HTTP 403.
    #[error("This endpoint requires the {0} plan or above")]
    InsufficientPlan(Plan),

    /// Request ceiling for the current window exhausted.
    ///
    /// Returns HTTP 429 with `X-RateLimit-*` and `Retry-After` headers
    /// taken from the carried decision.
    #[error("Rate limit exceeded")]
    RateLimited(RateDecision),

    /// Owner already holds the maximum number of active API keys.
    ///
    /// Returns HTTP 409.
    #[error("Active API key limit reached; revoke a key before creating another")]
    KeyLimitReached,

    /// API key does not exist or belongs to a different owner.
    ///
    /// Returns HTTP 404.
    #[error("API key not found")]
    KeyNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "RATE_LIMITED",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::MalformedAuthHeader => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string())
            }
            AppError::InvalidApiKey => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string())
            }
            AppError::InsufficientPlan(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),
            AppError::RateLimited(decision) => {
                let retry_after = decision.retry_after_secs(Utc::now().timestamp_millis());
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMITED",
                    format!("Rate limit exceeded. Try again in {retry_after} seconds."),
                )
            }
            AppError::KeyLimitReached => (StatusCode::CONFLICT, "LIMIT_REACHED", self.to_string()),
            AppError::KeyNotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            AppError::Database(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        let mut response = (status, body).into_response();

        // The 429 carries the limit telemetry so clients can back off
        // without parsing the body.
        if let AppError::RateLimited(decision) = self {
            let retry_after = decision.retry_after_secs(Utc::now().timestamp_millis());
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(decision.reset_at_ms));
            headers.insert("Retry-After", HeaderValue::from(retry_after));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rate_limit::WINDOW_MILLIS;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_variants_share_a_code() {
        for err in [AppError::MalformedAuthHeader, AppError::InvalidApiKey] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn invalid_key_message_does_not_distinguish_revoked() {
        let response = AppError::InvalidApiKey.into_response();
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Invalid API key");
    }

    #[tokio::test]
    async fn forbidden_names_the_required_plan() {
        let response = AppError::InsufficientPlan(Plan::Pro).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "FORBIDDEN");
        assert!(json["error"]["message"].as_str().unwrap().contains("pro"));
    }

    #[tokio::test]
    async fn rate_limited_carries_telemetry_headers() {
        let decision = RateDecision {
            allowed: false,
            limit: 60,
            remaining: 0,
            reset_at_ms: Utc::now().timestamp_millis() + WINDOW_MILLIS,
        };
        let response = AppError::RateLimited(decision).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["X-RateLimit-Limit"], "60");
        assert_eq!(headers["X-RateLimit-Remaining"], "0");
        let retry_after: i64 = headers["Retry-After"].to_str().unwrap().parse().unwrap();
        assert!((1..=60).contains(&retry_after));

        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn key_cap_maps_to_conflict() {
        let response = AppError::KeyLimitReached.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "LIMIT_REACHED");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response = AppError::Internal(anyhow::anyhow!("pool timeout: 10.0.0.3")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
        assert!(!json["error"]["message"].as_str().unwrap().contains("10.0.0.3"));
    }
}
