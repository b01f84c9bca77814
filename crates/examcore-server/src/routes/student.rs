//! Student-facing endpoints: the register's dashboard, viewing a stored
//! paper, and kicking off the submission workflow.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::student::StudentSession;
use crate::error::AppError;
use crate::orchestrator::SubmissionOutcome;
use crate::orchestrator::SubmissionOrchestrator;
use crate::state::AppState;
use crate::storage::StoredArtifactRef;

use super::upload::ArtifactSummary;

async fn mapped_register(state: &AppState, moodle_username: &str) -> Result<String, AppError> {
    sqlx::query_scalar("SELECT register_number FROM username_register_map WHERE moodle_username = $1")
        .bind(moodle_username)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("no register number mapped for this student"))
}

pub async fn dashboard(session: StudentSession, State(state): State<AppState>) -> Result<Json<Vec<ArtifactSummary>>, AppError> {
    let register = mapped_register(&state, &session.moodle_username).await?;
    let artifacts = state.artifacts.list_by_register(&register).await?;
    Ok(Json(artifacts.iter().map(ArtifactSummary::from).collect()))
}

pub async fn view_paper(
    session: StudentSession,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Response, AppError> {
    let register = mapped_register(&state, &session.moodle_username).await?;
    let artifact = state
        .artifacts
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("no such artifact"))?;

    if artifact.parsed_reg_no != register {
        return Err(AppError::authz("artifact does not belong to this student"));
    }

    let bytes = state
        .storage
        .read(&StoredArtifactRef {
            id: artifact.id,
            disk_path: artifact.disk_path.clone(),
            has_blob: artifact.has_blob,
        })
        .await
        .map_err(|e| AppError::storage_unavailable(e.to_string()))?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, artifact.mime_type.clone())], Body::from(bytes)).into_response())
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub submission_id: i64,
}

impl From<SubmissionOutcome> for SubmitResponse {
    fn from(outcome: SubmissionOutcome) -> Self {
        Self {
            submission_id: outcome.submission_id,
        }
    }
}

/// Builds an orchestrator on demand from already-shared state rather than
/// keeping a dedicated `AppState` field, since it is just a handful of
/// `Arc` clones of collaborators `AppState` already owns.
pub async fn submit(
    session: StudentSession,
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<SubmitResponse>, AppError> {
    let orchestrator = SubmissionOrchestrator::new(
        state.artifacts.clone(),
        state.storage.clone(),
        state.lms.clone(),
        state.notifier.clone(),
    );
    let outcome = orchestrator.submit(id, &session).await?;
    Ok(Json(outcome.into()))
}
