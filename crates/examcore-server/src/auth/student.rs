use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sqlx::PgPool;

use super::crypto;
use crate::error::AppError;
use crate::state::AppState;

/// An authenticated student's session, looked up fresh on every request
/// (no in-process caching, matching `AuthUser`'s per-request DB lookup).
#[derive(Debug, Clone)]
pub struct StudentSession {
    pub session_id: String,
    pub moodle_username: String,
    pub moodle_user_id: i64,
    encrypted_lms_token: Vec<u8>,
    encryption_key: [u8; 32],
}

impl StudentSession {
    /// Decrypts the stored LMS token. The plaintext must not outlive the
    /// handler call that needed it.
    pub fn decrypt_lms_token(&self) -> Result<String, AppError> {
        let bytes = crypto::decrypt(&self.encryption_key, &self.encrypted_lms_token)
            .map_err(|e| AppError::internal(format!("failed to decrypt stored LMS token: {e}")))?;
        String::from_utf8(bytes).map_err(|_| AppError::internal("decrypted LMS token was not valid UTF-8"))
    }
}

/// Generates a 256-bit random session id, hex-encoded.
pub fn generate_session_id() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

impl FromRequestParts<AppState> for StudentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(AppError::auth_required)?;

        let session_id = header
            .strip_prefix("Bearer ")
            .ok_or_else(AppError::auth_required)?;

        lookup_session(&state.db, session_id, state.encryption_key).await
    }
}

pub(crate) async fn lookup_session(
    db: &PgPool,
    session_id: &str,
    encryption_key: [u8; 32],
) -> Result<StudentSession, AppError> {
    let row: Option<(String, i64, Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT moodle_username, moodle_user_id, encrypted_lms_token, expires_at
         FROM student_sessions
         WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_optional(db)
    .await?;

    let (moodle_username, moodle_user_id, encrypted_lms_token, expires_at) =
        row.ok_or_else(|| AppError::auth_invalid("unknown or expired session"))?;

    if expires_at < Utc::now() {
        tracing::debug!(session_id, "student session expired");
        return Err(AppError::auth_invalid("session expired"));
    }

    Ok(StudentSession {
        session_id: session_id.to_string(),
        moodle_username,
        moodle_user_id,
        encrypted_lms_token,
        encryption_key,
    })
}

/// Deletes a session row, used by the logout handler.
pub async fn logout(db: &PgPool, session_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM student_sessions WHERE session_id = $1")
        .bind(session_id)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_session_id_returns_64_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_session_id_is_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn decrypt_lms_token_round_trips() {
        let key = [3u8; 32];
        let encrypted = crypto::encrypt(&key, b"moodle-token-xyz").unwrap();
        let session = StudentSession {
            session_id: "abc".to_string(),
            moodle_username: "student1".to_string(),
            moodle_user_id: 7,
            encrypted_lms_token: encrypted,
            encryption_key: key,
        };
        assert_eq!(session.decrypt_lms_token().unwrap(), "moodle-token-xyz");
    }

    #[test]
    fn decrypt_lms_token_fails_with_wrong_key() {
        let encrypted = crypto::encrypt(&[3u8; 32], b"moodle-token-xyz").unwrap();
        let session = StudentSession {
            session_id: "abc".to_string(),
            moodle_username: "student1".to_string(),
            moodle_user_id: 7,
            encrypted_lms_token: encrypted,
            encryption_key: [9u8; 32],
        };
        assert!(session.decrypt_lms_token().is_err());
    }
}
