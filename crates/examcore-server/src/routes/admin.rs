//! Admin-only operations layered over the core surface: subject->assignment
//! mappings, the audit trail, and artifact housekeeping. Every handler here
//! requires `StaffUser::is_admin()`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use examcore_common::model::{ExamType, SubjectMapping};
use serde::{Deserialize, Serialize};

use crate::auth::staff::StaffUser;
use crate::error::AppError;
use crate::state::AppState;

use super::upload::{ArtifactSummary, PaginationParams};

fn require_admin(staff: &StaffUser) -> Result<(), AppError> {
    if staff.is_admin() {
        Ok(())
    } else {
        Err(AppError::authz("admin role required"))
    }
}

// ── Subject mappings ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpsertMappingRequest {
    pub subject_code: String,
    pub exam_type: String,
    pub moodle_course_id: i64,
    pub moodle_assignment_id: i64,
    pub is_active: bool,
}

pub async fn list_mappings(staff: StaffUser, State(state): State<AppState>) -> Result<Json<Vec<SubjectMapping>>, AppError> {
    require_admin(&staff)?;
    let rows: Vec<(String, String, i64, i64, bool)> = sqlx::query_as(
        "SELECT subject_code, exam_type, moodle_course_id, moodle_assignment_id, is_active
         FROM subject_mappings ORDER BY subject_code, exam_type",
    )
    .fetch_all(&state.db)
    .await?;

    let mappings = rows
        .into_iter()
        .map(|(subject_code, exam_type, moodle_course_id, moodle_assignment_id, is_active)| {
            Ok(SubjectMapping {
                subject_code,
                exam_type: exam_type
                    .parse()
                    .map_err(|e: examcore_common::model::UnknownExamType| AppError::internal(e.to_string()))?,
                moodle_course_id,
                moodle_assignment_id,
                is_active,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(Json(mappings))
}

pub async fn upsert_mapping(
    staff: StaffUser,
    State(state): State<AppState>,
    Json(req): Json<UpsertMappingRequest>,
) -> Result<StatusCode, AppError> {
    require_admin(&staff)?;
    let exam_type: ExamType = req
        .exam_type
        .parse()
        .map_err(|_| AppError::validation(format!("unknown exam_type: {}", req.exam_type)))?;

    sqlx::query(
        "INSERT INTO subject_mappings (subject_code, exam_type, moodle_course_id, moodle_assignment_id, is_active)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (subject_code, exam_type)
         DO UPDATE SET moodle_course_id = $3, moodle_assignment_id = $4, is_active = $5",
    )
    .bind(&req.subject_code)
    .bind(exam_type.as_str())
    .bind(req.moodle_course_id)
    .bind(req.moodle_assignment_id)
    .bind(req.is_active)
    .execute(&state.db)
    .await?;

    crate::audit::record(
        &state.db,
        "MAPPING_UPSERT",
        "staff",
        &staff.username,
        &format!("{}/{}", req.subject_code, exam_type),
        serde_json::json!({"moodle_course_id": req.moodle_course_id, "moodle_assignment_id": req.moodle_assignment_id, "is_active": req.is_active}),
        "OK",
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ── Audit log ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub action: String,
    pub actor_type: String,
    pub actor_id: String,
    pub target: String,
    pub request_payload: serde_json::Value,
    pub result: String,
    pub created_at: DateTime<Utc>,
}

pub async fn list_audit_log(
    staff: StaffUser,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    require_admin(&staff)?;
    let rows: Vec<AuditLogEntry> = sqlx::query_as(
        "SELECT action, actor_type, actor_id, target, request_payload, result, created_at
         FROM audit_log ORDER BY created_at DESC OFFSET $1 LIMIT $2",
    )
    .bind(params.offset)
    .bind(params.limit)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

// ── Artifact housekeeping ────────────────────────────────────────────────

pub async fn list_unassigned(staff: StaffUser, State(state): State<AppState>) -> Result<Json<Vec<ArtifactSummary>>, AppError> {
    require_admin(&staff)?;
    let artifacts = state.artifacts.list_unassigned().await?;
    Ok(Json(artifacts.iter().map(ArtifactSummary::from).collect()))
}

pub async fn delete_artifact(
    staff: StaffUser,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<StatusCode, AppError> {
    require_admin(&staff)?;
    state.artifacts.soft_delete(id).await?;
    crate::audit::record(
        &state.db,
        "ARTIFACT_DELETE",
        "staff",
        &staff.username,
        &id.to_string(),
        serde_json::json!({}),
        "OK",
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PurgeAllRequest {
    #[serde(default)]
    pub confirm: bool,
}

pub async fn purge_all(
    staff: StaffUser,
    State(state): State<AppState>,
    Json(req): Json<PurgeAllRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&staff)?;
    let deleted = state.artifacts.purge_all(req.confirm, &staff.username).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
