//! Staff-facing ingestion endpoints: strict/flexible filename upload, bulk
//! upload, AI-assisted extraction upload, and the paginated staff listings.

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use examcore_common::model::{Artifact, ExamType, WorkflowStatus};
use examcore_common::parsing::{compute_fingerprint, normalize_subject_code, parse_flexible, parse_strict, sniff_mime};
use serde::{Deserialize, Serialize};

use crate::artifacts::{InsertOutcome, NewArtifact};
use crate::auth::staff::StaffUser;
use crate::error::AppError;
use crate::extraction::ExtractionOutcome;
use crate::state::AppState;

const MAX_MULTIPART_TOTAL_SIZE: usize = 200 * 1_024 * 1_024;

#[derive(Debug, Serialize)]
pub struct ArtifactSummary {
    pub id: uuid::Uuid,
    pub original_filename: String,
    pub canonical_filename: String,
    pub parsed_reg_no: String,
    pub parsed_subject_code: String,
    pub exam_type: ExamType,
    pub attempt_number: i32,
    pub workflow_status: WorkflowStatus,
    pub auto_processed: bool,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(a: &Artifact) -> Self {
        Self {
            id: a.id,
            original_filename: a.original_filename.clone(),
            canonical_filename: a.canonical_filename.clone(),
            parsed_reg_no: a.parsed_reg_no.clone(),
            parsed_subject_code: a.parsed_subject_code.clone(),
            exam_type: a.exam_type,
            attempt_number: a.attempt_number,
            workflow_status: a.workflow_status,
            auto_processed: a.auto_processed,
            uploaded_at: a.uploaded_at,
        }
    }
}

// ── Multipart parsing ───────────────────────────────────────────────────────

struct UploadFields {
    files: Vec<(String, Vec<u8>)>,
    exam_type: Option<String>,
    flexible: bool,
}

async fn parse_upload_fields(multipart: &mut Multipart, max_file_bytes: u64) -> Result<UploadFields, AppError> {
    let mut files = Vec::new();
    let mut exam_type = None;
    let mut flexible = false;
    let mut total_size: usize = 0;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            tracing::debug!("ignoring unnamed multipart field");
            continue;
        };
        let file_name = field.file_name().map(str::to_string);
        let bytes: Bytes = field.bytes().await.map_err(|e| AppError::validation(e.to_string()))?;

        total_size = total_size.saturating_add(bytes.len());
        if total_size > MAX_MULTIPART_TOTAL_SIZE {
            return Err(AppError::validation("upload exceeds total size limit"));
        }

        if name == "file" {
            let file_name = file_name.ok_or_else(|| AppError::validation("'file' field is missing a filename"))?;
            if bytes.len() as u64 > max_file_bytes {
                return Err(AppError::validation(format!("{file_name} exceeds the configured size limit")));
            }
            files.push((file_name, bytes.to_vec()));
        } else if name == "exam_type" {
            exam_type = Some(String::from_utf8_lossy(&bytes).trim().to_string());
        } else if name == "flexible" {
            flexible = bytes.as_ref() == b"true";
        }
    }

    Ok(UploadFields { files, exam_type, flexible })
}

// ── Filename / exam-type resolution ─────────────────────────────────────────

struct Identity {
    register_number: String,
    subject_code: String,
    extension: String,
    exam_type: Option<ExamType>,
}

fn resolve_identity(filename: &str, flexible: bool) -> Result<Identity, AppError> {
    if flexible {
        let partial = parse_flexible(filename);
        let register_number = partial.register_number.ok_or_else(|| {
            AppError::validation("could not recover a register number from this filename in flexible mode")
        })?;
        let subject_code = partial.subject_code.ok_or_else(|| {
            AppError::validation("could not recover a subject code from this filename in flexible mode")
        })?;
        let extension = split_extension(filename)?;
        Ok(Identity {
            register_number,
            subject_code,
            extension,
            exam_type: partial.exam_type,
        })
    } else {
        let parsed = parse_strict(filename)?;
        Ok(Identity {
            register_number: parsed.register_number,
            subject_code: parsed.subject_code,
            extension: parsed.extension,
            exam_type: None,
        })
    }
}

fn split_extension(filename: &str) -> Result<String, AppError> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .ok_or_else(|| AppError::validation("filename has no extension"))
}

fn resolve_exam_type(from_filename: Option<ExamType>, form_field: Option<&str>) -> Result<ExamType, AppError> {
    match form_field {
        Some(s) if !s.is_empty() => return s.parse().map_err(|_| AppError::validation(format!("unknown exam_type: {s}"))),
        _ => {}
    }
    if let Some(exam_type) = from_filename {
        return Ok(exam_type);
    }
    Ok(ExamType::DEFAULT)
}

// ── POST /upload/single, POST /upload/bulk ──────────────────────────────────

async fn process_upload(
    state: &AppState,
    staff: &StaffUser,
    filename: String,
    bytes: Vec<u8>,
    flexible: bool,
    exam_type_field: Option<&str>,
) -> Result<(Artifact, InsertOutcome), AppError> {
    let identity = resolve_identity(&filename, flexible)?;
    let exam_type = resolve_exam_type(identity.exam_type, exam_type_field)?;
    let mime_type = sniff_mime(&bytes, &identity.extension)?;

    let put = state
        .storage
        .put(&bytes, &identity.extension)
        .await
        .map_err(|e| AppError::storage_unavailable(e.to_string()))?;

    let idempotency_key = compute_fingerprint(&identity.register_number, &identity.subject_code, exam_type, &put.content_hash);

    let new = NewArtifact {
        original_filename: filename.clone(),
        canonical_filename: filename,
        parsed_reg_no: identity.register_number,
        parsed_subject_code: identity.subject_code,
        exam_type,
        content_hash: put.content_hash,
        size_bytes: put.size_bytes as i64,
        mime_type: mime_type.to_string(),
        disk_path: put.disk_path,
        blob: Some(bytes),
        idempotency_key,
        uploaded_by: staff.username.clone(),
        auto_processed: false,
    };

    state.artifacts.insert_or_get(new).await
}

fn status_for_outcome(outcome: InsertOutcome) -> StatusCode {
    match outcome {
        InsertOutcome::New => StatusCode::CREATED,
        InsertOutcome::Duplicate => StatusCode::OK,
    }
}

pub async fn upload_single(
    staff: StaffUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ArtifactSummary>), AppError> {
    let max_bytes = state.config.max_file_size_mb * 1024 * 1024;
    let mut fields = parse_upload_fields(&mut multipart, max_bytes).await?;
    let (filename, bytes) = fields
        .files
        .pop()
        .ok_or_else(|| AppError::validation("missing required 'file' field"))?;

    let (artifact, outcome) = process_upload(&state, &staff, filename, bytes, fields.flexible, fields.exam_type.as_deref()).await?;
    Ok((status_for_outcome(outcome), Json(ArtifactSummary::from(&artifact))))
}

#[derive(Debug, Serialize)]
pub struct BulkUploadError {
    pub filename: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BulkUploadResult {
    pub succeeded: Vec<ArtifactSummary>,
    pub failed: Vec<BulkUploadError>,
}

pub async fn upload_bulk(
    staff: StaffUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BulkUploadResult>, AppError> {
    let max_bytes = state.config.max_file_size_mb * 1024 * 1024;
    let fields = parse_upload_fields(&mut multipart, max_bytes).await?;
    if fields.files.is_empty() {
        return Err(AppError::validation("missing required 'file' field(s)"));
    }

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (filename, bytes) in fields.files {
        match process_upload(&state, &staff, filename.clone(), bytes, fields.flexible, fields.exam_type.as_deref()).await {
            Ok((artifact, _outcome)) => succeeded.push(ArtifactSummary::from(&artifact)),
            Err(e) => failed.push(BulkUploadError {
                filename,
                message: e.message,
            }),
        }
    }

    Ok(Json(BulkUploadResult { succeeded, failed }))
}

// ── POST /extract/scan-upload ───────────────────────────────────────────────

pub async fn scan_upload(
    staff: StaffUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ArtifactSummary>), AppError> {
    let max_bytes = state.config.max_file_size_mb * 1024 * 1024;
    let mut fields = parse_upload_fields(&mut multipart, max_bytes).await?;
    let (filename, bytes) = fields
        .files
        .pop()
        .ok_or_else(|| AppError::validation("missing required 'file' field"))?;

    let declared_exam_type = resolve_exam_type(None, fields.exam_type.as_deref())?;
    let extension = split_extension(&filename)?;

    let outcome = state
        .extraction
        .infer(&bytes, declared_exam_type)
        .await
        .map_err(|e| AppError::upstream_transient(e.to_string()))?;

    let high_confidence = outcome.is_high_confidence();
    let (register_number, subject_code, canonical_filename, auto_processed) = match outcome {
        ExtractionOutcome::Inferred {
            register_number,
            subject_code,
            ..
        } if high_confidence => {
            let subject_code = normalize_subject_code(&subject_code).unwrap_or(subject_code);
            let canonical_filename = format!("{register_number}_{subject_code}_{declared_exam_type}.{extension}");
            (register_number, subject_code, canonical_filename, true)
        }
        ExtractionOutcome::Inferred {
            register_number,
            subject_code,
            ..
        } => {
            let subject_code = normalize_subject_code(&subject_code).unwrap_or(subject_code);
            (register_number, subject_code, filename.clone(), false)
        }
        ExtractionOutcome::Degraded(_) => {
            let partial = parse_flexible(&filename);
            let register_number = partial
                .register_number
                .ok_or_else(|| AppError::validation("extraction degraded and filename has no recoverable register number"))?;
            let subject_code = partial
                .subject_code
                .ok_or_else(|| AppError::validation("extraction degraded and filename has no recoverable subject code"))?;
            (register_number, subject_code, filename.clone(), false)
        }
    };

    let mime_type = sniff_mime(&bytes, &extension)?;
    let put = state
        .storage
        .put(&bytes, &extension)
        .await
        .map_err(|e| AppError::storage_unavailable(e.to_string()))?;
    let idempotency_key = compute_fingerprint(&register_number, &subject_code, declared_exam_type, &put.content_hash);

    let new = NewArtifact {
        original_filename: filename,
        canonical_filename,
        parsed_reg_no: register_number,
        parsed_subject_code: subject_code,
        exam_type: declared_exam_type,
        content_hash: put.content_hash,
        size_bytes: put.size_bytes as i64,
        mime_type: mime_type.to_string(),
        disk_path: put.disk_path,
        blob: Some(bytes),
        idempotency_key,
        uploaded_by: staff.username,
        auto_processed,
    };

    let (artifact, outcome) = state.artifacts.insert_or_get(new).await?;
    Ok((status_for_outcome(outcome), Json(ArtifactSummary::from(&artifact))))
}

// ── GET /upload/all, GET /upload/auto-processed ─────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_all(
    _staff: StaffUser,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<ArtifactSummary>>, AppError> {
    let artifacts = state.artifacts.list_paginated(params.offset, params.limit).await?;
    Ok(Json(artifacts.iter().map(ArtifactSummary::from).collect()))
}

pub async fn list_auto_processed(_staff: StaffUser, State(state): State<AppState>) -> Result<Json<Vec<ArtifactSummary>>, AppError> {
    let artifacts = state.artifacts.list_auto_processed(true).await?;
    Ok(Json(artifacts.iter().map(ArtifactSummary::from).collect()))
}
