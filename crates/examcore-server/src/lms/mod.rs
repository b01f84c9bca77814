//! Wire-level client for the LMS (Moodle-compatible) web-service protocol.

pub mod mock;
pub mod real;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    pub userid: i64,
    pub username: String,
    pub fullname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodleUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
}

/// Opaque handle to a file uploaded into a user's Moodle draft area.
pub type DraftItemId = i64;

/// Opaque handle to a finalised assignment submission.
pub type SubmissionId = i64;

/// Classification of an LMS call failure, mirroring the table in the
/// component design: network/timeout is retryable, permission and
/// credential failures are not, payload rejections are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LmsError {
    Transient(String),
    AuthInvalid(String),
    Authz(String),
    PayloadReject(String),
    Unknown(String),
}

impl std::fmt::Display for LmsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(m) => write!(f, "transient LMS error: {m}"),
            Self::AuthInvalid(m) => write!(f, "invalid LMS token: {m}"),
            Self::Authz(m) => write!(f, "LMS permission denied: {m}"),
            Self::PayloadReject(m) => write!(f, "LMS rejected payload: {m}"),
            Self::Unknown(m) => write!(f, "unclassified LMS error: {m}"),
        }
    }
}

impl std::error::Error for LmsError {}

/// Classifies a parsed Moodle `{exception, errorcode, message}` error body
/// into one of the stable [`LmsError`] variants.
#[must_use]
pub fn classify_errorcode(errorcode: &str, message: &str) -> LmsError {
    match errorcode {
        "invalidtoken" | "tokennotfound" | "invalidlogin" => LmsError::AuthInvalid(message.to_string()),
        "nopermissions" | "nopermission" => LmsError::Authz(message.to_string()),
        "invalidfiletype" | "maxbytesexceeded" | "userquotalimitbytes" => {
            LmsError::PayloadReject(message.to_string())
        }
        other => LmsError::Unknown(format!("{other}: {message}")),
    }
}

#[async_trait::async_trait]
pub trait LmsClient: Send + Sync {
    async fn token_exchange(&self, username: &str, password: &str) -> Result<String, LmsError>;
    async fn site_info(&self, token: &str) -> Result<SiteInfo, LmsError>;
    async fn user_by_field(&self, token: &str, field: &str, value: &str) -> Result<MoodleUser, LmsError>;
    async fn upload_file(&self, token: &str, bytes: Vec<u8>, filename: &str) -> Result<DraftItemId, LmsError>;
    async fn save_submission(&self, token: &str, assignment_id: i64, item_id: DraftItemId) -> Result<(), LmsError>;
    async fn submit_for_grading(&self, token: &str, assignment_id: i64) -> Result<SubmissionId, LmsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_invalid_token_as_auth_invalid() {
        assert!(matches!(
            classify_errorcode("invalidtoken", "bad token"),
            LmsError::AuthInvalid(_)
        ));
    }

    #[test]
    fn classifies_no_permissions_as_authz() {
        assert!(matches!(
            classify_errorcode("nopermissions", "no access"),
            LmsError::Authz(_)
        ));
    }

    #[test]
    fn classifies_file_type_as_payload_reject() {
        assert!(matches!(
            classify_errorcode("invalidfiletype", "bad type"),
            LmsError::PayloadReject(_)
        ));
    }

    #[test]
    fn classifies_unrecognized_code_as_unknown() {
        assert!(matches!(
            classify_errorcode("somethingelse", "mystery"),
            LmsError::Unknown(_)
        ));
    }
}
