use axum::{Json, http::StatusCode, response::IntoResponse};
use examcore_common::ErrorKind;
use serde_json::json;

use crate::rate_limit::RateLimitResult;

/// The closed error type returned from every handler. Wraps a stable
/// [`ErrorKind`] plus a human message; never leaks a stack trace.
#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_after_secs: Option<u64>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    #[must_use]
    pub fn rate_limited(result: &RateLimitResult) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: "rate limit exceeded".to_string(),
            retry_after_secs: Some(result.reset_after_secs),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    #[must_use]
    pub fn already_in_flight() -> Self {
        Self::new(ErrorKind::Conflict, "submission already in flight")
    }

    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorKind::AuthRequired, "authentication required")
    }

    #[must_use]
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthInvalid, message)
    }

    #[must_use]
    pub fn authz(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authz, message)
    }

    #[must_use]
    pub fn upstream_transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamTransient, message)
    }

    #[must_use]
    pub fn upstream_reject(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamReject, message)
    }

    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageUnavailable, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorKind::AuthInvalid => StatusCode::UNAUTHORIZED,
            ErrorKind::Authz => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::UpstreamTransient | ErrorKind::UpstreamReject => StatusCode::BAD_GATEWAY,
            ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        if matches!(self.kind, ErrorKind::Internal | ErrorKind::StorageUnavailable) {
            tracing::error!(kind = %self.kind, "{}", self.message);
        }
        let status = self.status();
        let body = json!({
            "kind": self.kind,
            "message": self.message,
        });
        if let Some(secs) = self.retry_after_secs {
            return (status, [("retry-after", secs.to_string())], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<examcore_common::error::ParseError> for AppError {
    fn from(err: examcore_common::error::ParseError) -> Self {
        Self::validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn validation_returns_400() {
        let resp = AppError::validation("bad filename").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "VALIDATION");
    }

    #[tokio::test]
    async fn conflict_returns_409() {
        let resp = AppError::already_in_flight().into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn storage_unavailable_returns_503() {
        let resp = AppError::storage_unavailable("disk and blob both failed").into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn upstream_transient_returns_502() {
        let resp = AppError::upstream_transient("lms timeout").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn authz_returns_403() {
        let resp = AppError::authz("not an admin").into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let resp = AppError::not_found("no such artifact").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rate_limited_returns_429_with_retry_after() {
        let result = crate::rate_limit::RateLimitResult {
            allowed: false,
            limit: 60,
            remaining: 0,
            reset_after_secs: 42,
        };
        let resp = AppError::rate_limited(&result).into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("retry-after").unwrap(), "42");
    }
}
