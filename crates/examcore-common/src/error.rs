//! The stable error-kind taxonomy.
//!
//! This is the identifier surfaced to API clients and written into the audit
//! log. `examcore-server::error::AppError` wraps one of these per variant and
//! is responsible for the HTTP status mapping; this crate only defines the
//! identifier and the human string, so the taxonomy can be reused outside the
//! HTTP layer (audit log, retry worker logs).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    AuthRequired,
    AuthInvalid,
    Authz,
    NotFound,
    Conflict,
    RateLimited,
    UpstreamTransient,
    UpstreamReject,
    StorageUnavailable,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "VALIDATION",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AuthInvalid => "AUTH_INVALID",
            Self::Authz => "AUTHZ",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::UpstreamTransient => "UPSTREAM_TRANSIENT",
            Self::UpstreamReject => "UPSTREAM_REJECT",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("filename does not match the strict {{register}}_{{subject}}.{{ext}} pattern")]
    MalformedFilename,
    #[error("register number must be exactly 12 ASCII digits")]
    InvalidRegisterNumber,
    #[error("subject code must match [A-Z0-9]{{2,10}}")]
    InvalidSubjectCode,
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),
    #[error("file content does not match its declared extension")]
    ContentMismatch,
}
