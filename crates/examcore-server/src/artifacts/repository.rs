use chrono::{DateTime, Utc};
use examcore_common::model::{Artifact, ExamType, WorkflowStatus};
use sqlx::PgPool;

use crate::audit;
use crate::error::AppError;

/// Fields needed to insert a new artifact row; everything the repository
/// itself computes (attempt number, workflow status, timestamps) is left out.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub original_filename: String,
    pub canonical_filename: String,
    pub parsed_reg_no: String,
    pub parsed_subject_code: String,
    pub exam_type: ExamType,
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub disk_path: Option<String>,
    pub blob: Option<Vec<u8>>,
    pub idempotency_key: String,
    pub uploaded_by: String,
    pub auto_processed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    New,
    Duplicate,
}

/// `sqlx::FromRow`-compatible mirror of the `artifacts` table, kept in
/// `examcore-server` so `examcore-common::Artifact` stays free of a `sqlx`
/// dependency.
#[derive(Debug, sqlx::FromRow)]
struct ArtifactRow {
    id: uuid::Uuid,
    original_filename: String,
    canonical_filename: String,
    parsed_reg_no: String,
    parsed_subject_code: String,
    exam_type: String,
    attempt_number: i32,
    content_hash: String,
    size_bytes: i64,
    mime_type: String,
    disk_path: Option<String>,
    has_blob: bool,
    moodle_user_id: Option<i64>,
    moodle_username: Option<String>,
    moodle_course_id: Option<i64>,
    moodle_assignment_id: Option<i64>,
    draft_item_id: Option<i64>,
    submission_id: Option<i64>,
    workflow_status: String,
    idempotency_key: String,
    uploaded_by: String,
    auto_processed: bool,
    retry_count: i32,
    error_message: Option<String>,
    transaction_log: serde_json::Value,
    tombstoned: bool,
    uploaded_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = AppError;

    fn try_from(row: ArtifactRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            original_filename: row.original_filename,
            canonical_filename: row.canonical_filename,
            parsed_reg_no: row.parsed_reg_no,
            parsed_subject_code: row.parsed_subject_code,
            exam_type: row
                .exam_type
                .parse()
                .map_err(|e: examcore_common::model::UnknownExamType| AppError::internal(e.to_string()))?,
            attempt_number: row.attempt_number,
            content_hash: row.content_hash,
            size_bytes: row.size_bytes,
            mime_type: row.mime_type,
            disk_path: row.disk_path,
            has_blob: row.has_blob,
            moodle_user_id: row.moodle_user_id,
            moodle_username: row.moodle_username,
            moodle_course_id: row.moodle_course_id,
            moodle_assignment_id: row.moodle_assignment_id,
            draft_item_id: row.draft_item_id,
            submission_id: row.submission_id,
            workflow_status: row
                .workflow_status
                .parse()
                .map_err(|e: examcore_common::model::UnknownWorkflowStatus| AppError::internal(e.to_string()))?,
            idempotency_key: row.idempotency_key,
            uploaded_by: row.uploaded_by,
            auto_processed: row.auto_processed,
            retry_count: row.retry_count,
            error_message: row.error_message,
            transaction_log: row.transaction_log,
            tombstoned: row.tombstoned,
            uploaded_at: row.uploaded_at,
            validated_at: row.validated_at,
            submitted_at: row.submitted_at,
            completed_at: row.completed_at,
        })
    }
}

const ARTIFACT_COLUMNS: &str = "id, original_filename, canonical_filename, parsed_reg_no, parsed_subject_code,
     exam_type, attempt_number, content_hash, size_bytes, mime_type, disk_path, has_blob,
     moodle_user_id, moodle_username, moodle_course_id, moodle_assignment_id, draft_item_id,
     submission_id, workflow_status, idempotency_key, uploaded_by, auto_processed, retry_count,
     error_message, transaction_log, tombstoned, uploaded_at, validated_at, submitted_at, completed_at";

pub struct ArtifactRepository {
    db: PgPool,
}

impl ArtifactRepository {
    #[must_use]
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    /// Implements the insert protocol: advisory per-fingerprint lock,
    /// idempotency-key lookup, supersede-and-attempt-increment, insert, and
    /// a unique-violation fallback if another request raced us to the same
    /// fingerprint between the lookup and the insert.
    pub async fn insert_or_get(&self, new: NewArtifact) -> Result<(Artifact, InsertOutcome), AppError> {
        let mut tx = self.db.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&new.idempotency_key)
            .execute(&mut *tx)
            .await?;

        if let Some(row) = fetch_by_idempotency_key(&mut *tx, &new.idempotency_key).await? {
            audit::record(
                &mut *tx,
                "UPLOAD_DUP",
                "staff",
                &new.uploaded_by,
                &row.id.to_string(),
                serde_json::json!({"idempotency_key": new.idempotency_key}),
                "OK",
            )
            .await?;
            tx.commit().await?;
            return Ok((row.try_into()?, InsertOutcome::Duplicate));
        }

        let prior = fetch_latest_for_tuple(
            &mut *tx,
            &new.parsed_reg_no,
            &new.parsed_subject_code,
            new.exam_type,
        )
        .await?;

        let attempt_number = match prior {
            Some(ref p) if p.workflow_status != WorkflowStatus::Superseded.as_str() => {
                sqlx::query("UPDATE artifacts SET workflow_status = 'SUPERSEDED' WHERE id = $1")
                    .bind(p.id)
                    .execute(&mut *tx)
                    .await?;
                p.attempt_number + 1
            }
            _ => 1,
        };

        let row: ArtifactRow = sqlx::query_as(&format!(
            "INSERT INTO artifacts (
                 original_filename, canonical_filename, parsed_reg_no, parsed_subject_code,
                 exam_type, attempt_number, content_hash, size_bytes, mime_type, disk_path,
                 has_blob, artifact_blob, workflow_status, idempotency_key, uploaded_by,
                 auto_processed, transaction_log, uploaded_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'PENDING', $13, $14, $15, '[]'::jsonb, NOW())
             RETURNING {ARTIFACT_COLUMNS}"
        ))
        .bind(&new.original_filename)
        .bind(&new.canonical_filename)
        .bind(&new.parsed_reg_no)
        .bind(&new.parsed_subject_code)
        .bind(new.exam_type.as_str())
        .bind(attempt_number)
        .bind(&new.content_hash)
        .bind(new.size_bytes)
        .bind(&new.mime_type)
        .bind(&new.disk_path)
        .bind(new.blob.is_some())
        .bind(&new.blob)
        .bind(&new.idempotency_key)
        .bind(&new.uploaded_by)
        .bind(new.auto_processed)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            "UPLOAD",
            "staff",
            &new.uploaded_by,
            &row.id.to_string(),
            serde_json::json!({"idempotency_key": new.idempotency_key, "attempt_number": attempt_number}),
            "OK",
        )
        .await?;

        match tx.commit().await {
            Ok(()) => Ok((row.try_into()?, InsertOutcome::New)),
            Err(e) if is_unique_violation(&e) => {
                tracing::info!(idempotency_key = %new.idempotency_key, "lost insert race, falling back to lookup");
                let row = fetch_by_idempotency_key(&self.db, &new.idempotency_key)
                    .await?
                    .ok_or_else(|| AppError::internal("insert race fallback found no row"))?;
                Ok((row.try_into()?, InsertOutcome::Duplicate))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id(&self, id: uuid::Uuid) -> Result<Option<Artifact>, AppError> {
        let row: Option<ArtifactRow> =
            sqlx::query_as(&format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.db)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn list_by_staff(&self, uploaded_by: &str) -> Result<Vec<Artifact>, AppError> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE uploaded_by = $1 ORDER BY uploaded_at DESC"
        ))
        .bind(uploaded_by)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn list_by_register(&self, parsed_reg_no: &str) -> Result<Vec<Artifact>, AppError> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE parsed_reg_no = $1 ORDER BY uploaded_at DESC"
        ))
        .bind(parsed_reg_no)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn list_by_status(&self, status: WorkflowStatus) -> Result<Vec<Artifact>, AppError> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE workflow_status = $1 ORDER BY uploaded_at DESC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn list_auto_processed(&self, auto_processed: bool) -> Result<Vec<Artifact>, AppError> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE auto_processed = $1 ORDER BY uploaded_at DESC"
        ))
        .bind(auto_processed)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn list_paginated(&self, offset: i64, limit: i64) -> Result<Vec<Artifact>, AppError> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts ORDER BY uploaded_at DESC OFFSET $1 LIMIT $2"
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Lists artifacts whose `parsed_reg_no` has no entry in
    /// `username_register_map` — the staff "unassigned" view for artifacts
    /// an AI result produced with no matching student mapping.
    pub async fn list_unassigned(&self) -> Result<Vec<Artifact>, AppError> {
        let rows: Vec<ArtifactRow> = sqlx::query_as(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts a
             WHERE NOT EXISTS (
                 SELECT 1 FROM username_register_map m WHERE m.register_number = a.parsed_reg_no
             )
             ORDER BY uploaded_at DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Marks a single artifact `SUPERSEDED` and tombstoned — the soft-delete
    /// path for admin artifact removal.
    pub async fn soft_delete(&self, id: uuid::Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE artifacts SET workflow_status = 'SUPERSEDED', tombstoned = true WHERE id = $1",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("no such artifact"));
        }
        Ok(())
    }

    /// Hard-deletes every artifact row. Gated on `confirm` and audited
    /// before execution since it cannot be undone.
    pub async fn purge_all(&self, confirm: bool, actor_id: &str) -> Result<u64, AppError> {
        if !confirm {
            return Err(AppError::validation("purge_all requires confirm=true"));
        }
        audit::record(
            &self.db,
            "PURGE_ALL",
            "staff",
            actor_id,
            "artifacts:*",
            serde_json::json!({}),
            "OK",
        )
        .await?;
        let result = sqlx::query("DELETE FROM artifacts").execute(&self.db).await?;
        Ok(result.rows_affected())
    }
}

async fn fetch_by_idempotency_key<'c, E>(executor: E, idempotency_key: &str) -> Result<Option<ArtifactRow>, AppError>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<ArtifactRow> = sqlx::query_as(&format!(
        "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE idempotency_key = $1"
    ))
    .bind(idempotency_key)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

async fn fetch_latest_for_tuple<'c, E>(
    executor: E,
    parsed_reg_no: &str,
    parsed_subject_code: &str,
    exam_type: ExamType,
) -> Result<Option<ArtifactRow>, AppError>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<ArtifactRow> = sqlx::query_as(&format!(
        "SELECT {ARTIFACT_COLUMNS} FROM artifacts
         WHERE parsed_reg_no = $1 AND parsed_subject_code = $2 AND exam_type = $3
           AND workflow_status != 'SUPERSEDED'
         ORDER BY attempt_number DESC LIMIT 1 FOR UPDATE"
    ))
    .bind(parsed_reg_no)
    .bind(parsed_subject_code)
    .bind(exam_type.as_str())
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_unique_violation_rejects_other_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
