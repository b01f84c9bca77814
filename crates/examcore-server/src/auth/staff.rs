use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::state::AppState;

/// Roles a staff account can hold. Admin-only endpoints reject anything
/// other than `Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Faculty,
    Admin,
}

#[derive(Debug, Clone)]
pub struct StaffUser {
    pub staff_id: i64,
    pub username: String,
    pub role: StaffRole,
}

impl StaffUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self.role, StaffRole::Admin)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    staff_id: i64,
    role: StaffRole,
    iat: i64,
    exp: i64,
}

/// Hashes a plaintext password with bcrypt at cost 12.
pub fn hash_password(plaintext: &str) -> Result<String, AppError> {
    bcrypt::hash(plaintext, 12).map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

/// Verifies a plaintext password against a stored bcrypt hash.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

/// Signs a new bearer token for the given staff account, valid for
/// `lifetime_minutes` (see `Config::access_token_expire_minutes`).
pub fn issue_token(staff_id: i64, role: StaffRole, secret_key: &[u8], lifetime_minutes: i64) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        staff_id,
        role,
        iat: now.timestamp(),
        exp: (now + Duration::minutes(lifetime_minutes)).timestamp(),
    };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret_key))
        .map_err(|e| AppError::internal(format!("token signing failed: {e}")))
}

fn decode_claims(token: &str, secret_key: &[u8]) -> Result<Claims, AppError> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret_key),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::auth_invalid(format!("invalid staff token: {e}")))
}

impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(AppError::auth_required)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(AppError::auth_required)?;

        let claims = decode_claims(token, state.config.secret_key.as_bytes())?;
        lookup_staff_by_id(&state.db, claims.staff_id, claims.role).await
    }
}

async fn lookup_staff_by_id(db: &PgPool, staff_id: i64, claimed_role: StaffRole) -> Result<StaffUser, AppError> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT username, role FROM staff_users WHERE id = $1")
            .bind(staff_id)
            .fetch_optional(db)
            .await?;

    let (username, role_str) = row.ok_or_else(|| AppError::auth_invalid("unknown staff account"))?;
    let role = parse_role(&role_str)?;

    if role != claimed_role {
        // Role was changed server-side after the token was issued.
        tracing::warn!(staff_id, "staff token role no longer matches stored role");
        return Err(AppError::auth_invalid("stale token: role changed"));
    }

    Ok(StaffUser {
        staff_id,
        username,
        role,
    })
}

fn parse_role(value: &str) -> Result<StaffRole, AppError> {
    match value {
        "faculty" => Ok(StaffRole::Faculty),
        "admin" => Ok(StaffRole::Admin),
        other => Err(AppError::internal(format!("unknown staff role in database: {other}"))),
    }
}

/// Row shape for inserting a new staff account (used by the admin
/// account-creation path and by test fixtures).
#[derive(Debug, Clone)]
pub struct NewStaffUser {
    pub username: String,
    pub password_hash: String,
    pub role: StaffRole,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key-not-for-production";

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn issue_then_decode_round_trips_claims() {
        let token = issue_token(42, StaffRole::Faculty, SECRET, 60).unwrap();
        let claims = decode_claims(&token, SECRET).unwrap();
        assert_eq!(claims.staff_id, 42);
        assert_eq!(claims.role, StaffRole::Faculty);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn issue_token_honors_configured_lifetime() {
        let short = issue_token(1, StaffRole::Faculty, SECRET, 5).unwrap();
        let long = issue_token(1, StaffRole::Faculty, SECRET, 120).unwrap();
        let short_claims = decode_claims(&short, SECRET).unwrap();
        let long_claims = decode_claims(&long, SECRET).unwrap();
        assert!(long_claims.exp - long_claims.iat > short_claims.exp - short_claims.iat);
    }

    #[test]
    fn decode_rejects_wrong_secret() {
        let token = issue_token(1, StaffRole::Admin, SECRET, 60).unwrap();
        assert!(decode_claims(&token, b"a completely different secret key").is_err());
    }

    #[test]
    fn decode_rejects_tampered_token() {
        let mut token = issue_token(1, StaffRole::Admin, SECRET, 60).unwrap();
        token.push('x');
        assert!(decode_claims(&token, SECRET).is_err());
    }

    #[test]
    fn parse_role_rejects_unknown_value() {
        assert!(parse_role("superuser").is_err());
    }

    #[test]
    fn is_admin_reflects_role() {
        let admin = StaffUser {
            staff_id: 1,
            username: "a".into(),
            role: StaffRole::Admin,
        };
        let faculty = StaffUser {
            staff_id: 2,
            username: "b".into(),
            role: StaffRole::Faculty,
        };
        assert!(admin.is_admin());
        assert!(!faculty.is_admin());
    }
}
