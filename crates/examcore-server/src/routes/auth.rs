//! Staff and student login/logout. Staff authenticate against a local
//! bcrypt-hashed password; students authenticate by exchanging their Moodle
//! credentials for a web-service token, which is encrypted and held server
//! side so later handlers never see the plaintext again.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::staff::{self, StaffRole, StaffUser};
use crate::auth::student::{self, StudentSession};
use crate::auth::crypto;
use crate::error::AppError;
use crate::lms::LmsError;
use crate::state::AppState;

use super::ip::extract_ip;

// ── Staff ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StaffLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct StaffLoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn staff_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StaffLoginRequest>,
) -> Result<Json<StaffLoginResponse>, AppError> {
    let ip = extract_ip(&headers, None);
    let rl = state.ip_rate_limiter.check_and_increment(format!("staff-login:{ip}"));
    if !rl.allowed {
        return Err(AppError::rate_limited(&rl));
    }

    let row: Option<(i64, String, String)> =
        sqlx::query_as("SELECT id, password_hash, role FROM staff_users WHERE username = $1")
            .bind(&req.username)
            .fetch_optional(&state.db)
            .await?;

    let Some((staff_id, password_hash, role_str)) = row else {
        crate::audit::record(&state.db, "STAFF_LOGIN", "staff", &req.username, "auth", serde_json::json!({}), "FAIL")
            .await
            .ok();
        return Err(AppError::auth_invalid("invalid username or password"));
    };

    if !staff::verify_password(&req.password, &password_hash) {
        crate::audit::record(&state.db, "STAFF_LOGIN", "staff", &req.username, "auth", serde_json::json!({}), "FAIL")
            .await
            .ok();
        return Err(AppError::auth_invalid("invalid username or password"));
    }

    let role = match role_str.as_str() {
        "faculty" => StaffRole::Faculty,
        "admin" => StaffRole::Admin,
        other => return Err(AppError::internal(format!("unknown staff role in database: {other}"))),
    };

    let token = staff::issue_token(staff_id, role, state.config.secret_key.as_bytes(), state.config.access_token_expire_minutes)?;
    let expires_at = Utc::now() + Duration::minutes(state.config.access_token_expire_minutes);

    crate::audit::record(&state.db, "STAFF_LOGIN", "staff", &req.username, "auth", serde_json::json!({}), "OK").await?;

    Ok(Json(StaffLoginResponse { token, expires_at }))
}

pub async fn staff_logout(staff: StaffUser, State(state): State<AppState>) -> Result<StatusCode, AppError> {
    // Tokens are stateless (JWT); logout is recorded for the audit trail only,
    // the client is expected to discard the bearer token.
    crate::audit::record(&state.db, "STAFF_LOGOUT", "staff", &staff.username, "auth", serde_json::json!({}), "OK").await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Student ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StudentLoginRequest {
    pub moodle_username: String,
    pub moodle_password: String,
}

#[derive(Debug, Serialize)]
pub struct StudentLoginResponse {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn student_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StudentLoginRequest>,
) -> Result<Json<StudentLoginResponse>, AppError> {
    let ip = extract_ip(&headers, None);
    let rl = state.ip_rate_limiter.check_and_increment(format!("student-login:{ip}"));
    if !rl.allowed {
        return Err(AppError::rate_limited(&rl));
    }

    let token = state
        .lms
        .token_exchange(&req.moodle_username, &req.moodle_password)
        .await
        .map_err(|e| lms_login_error(&e))?;

    let info = state.lms.site_info(&token).await.map_err(|e| lms_login_error(&e))?;

    let encrypted_token = crypto::encrypt(&state.encryption_key, token.as_bytes())
        .map_err(|e| AppError::internal(format!("failed to encrypt LMS token: {e}")))?;

    let session_id = student::generate_session_id();
    let expires_at = Utc::now() + Duration::hours(state.config.session_expire_hours);

    sqlx::query(
        "INSERT INTO student_sessions (session_id, moodle_username, moodle_user_id, encrypted_lms_token, expires_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&session_id)
    .bind(&info.username)
    .bind(info.userid)
    .bind(&encrypted_token)
    .bind(expires_at)
    .execute(&state.db)
    .await?;

    crate::audit::record(
        &state.db,
        "STUDENT_LOGIN",
        "student",
        &info.username,
        "auth",
        serde_json::json!({}),
        "OK",
    )
    .await?;

    Ok(Json(StudentLoginResponse { session_id, expires_at }))
}

fn lms_login_error(err: &LmsError) -> AppError {
    match err {
        LmsError::AuthInvalid(m) => AppError::auth_invalid(m.clone()),
        LmsError::Transient(m) | LmsError::Unknown(m) => AppError::upstream_transient(m.clone()),
        LmsError::Authz(m) => AppError::authz(m.clone()),
        LmsError::PayloadReject(m) => AppError::upstream_reject(m.clone()),
    }
}

pub async fn student_logout(session: StudentSession, State(state): State<AppState>) -> Result<StatusCode, AppError> {
    student::logout(&state.db, &session.session_id).await?;
    crate::audit::record(
        &state.db,
        "STUDENT_LOGOUT",
        "student",
        &session.moodle_username,
        "auth",
        serde_json::json!({}),
        "OK",
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lms_login_error_maps_auth_invalid() {
        let app_err = lms_login_error(&LmsError::AuthInvalid("bad creds".to_string()));
        assert_eq!(app_err.kind, examcore_common::ErrorKind::AuthInvalid);
    }

    #[test]
    fn lms_login_error_maps_transient_to_upstream_transient() {
        let app_err = lms_login_error(&LmsError::Transient("timeout".to_string()));
        assert_eq!(app_err.kind, examcore_common::ErrorKind::UpstreamTransient);
    }

    #[test]
    fn lms_login_error_maps_authz() {
        let app_err = lms_login_error(&LmsError::Authz("denied".to_string()));
        assert_eq!(app_err.kind, examcore_common::ErrorKind::Authz);
    }
}
