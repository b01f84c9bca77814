//! Drives an artifact through the LMS submission workflow on behalf of a
//! student: the multi-step, non-transactional LMS conversation with a
//! conditional-update lock and a backing retry queue.

pub mod retry_worker;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use examcore_common::model::SubjectMapping;
use sqlx::PgPool;

use crate::artifacts::ArtifactRepository;
use crate::auth::student::StudentSession;
use crate::error::AppError;
use crate::lms::{LmsClient, LmsError};
use crate::notify::{NotifyKind, Notifier};
use crate::storage::{ArtifactStorage, StoredArtifactRef};

const MAX_RETRY_COUNT: i32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct SubmissionOutcome {
    pub submission_id: i64,
}

pub struct SubmissionOrchestrator {
    repository: Arc<ArtifactRepository>,
    storage: Arc<dyn ArtifactStorage>,
    lms: Arc<dyn LmsClient>,
    notifier: Arc<dyn Notifier>,
}

impl SubmissionOrchestrator {
    #[must_use]
    pub fn new(
        repository: Arc<ArtifactRepository>,
        storage: Arc<dyn ArtifactStorage>,
        lms: Arc<dyn LmsClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repository,
            storage,
            lms,
            notifier,
        }
    }

    fn pool(&self) -> &PgPool {
        self.repository.pool()
    }

    pub async fn submit(
        &self,
        artifact_id: uuid::Uuid,
        session: &StudentSession,
    ) -> Result<SubmissionOutcome, AppError> {
        let artifact = self
            .repository
            .find_by_id(artifact_id)
            .await?
            .ok_or_else(|| AppError::not_found("no such artifact"))?;

        if artifact.parsed_reg_no != mapped_register(self.pool(), &session.moodle_username).await? {
            return Err(AppError::authz("artifact does not belong to this student"));
        }

        let mapping = fetch_active_mapping(self.pool(), &artifact.parsed_subject_code, artifact.exam_type)
            .await?
            .ok_or_else(|| AppError::not_found("no active subject mapping for this artifact"))?;

        // Step 1: CAS transition PENDING|FAILED -> SUBMITTING.
        let result = sqlx::query(
            "UPDATE artifacts SET workflow_status = 'SUBMITTING', submitted_at = NOW()
             WHERE id = $1 AND workflow_status IN ('PENDING', 'FAILED')",
        )
        .bind(artifact_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() != 1 {
            return Err(AppError::already_in_flight());
        }

        append_transaction_log(self.pool(), artifact_id, "SUBMITTING").await?;

        // This attempt now owns the artifact; any queue row left over from a
        // previous failed attempt is stale.
        sqlx::query("DELETE FROM submission_queue WHERE artifact_id = $1 AND status = 'pending'")
            .bind(artifact_id)
            .execute(self.pool())
            .await?;

        match self.drive_submission(artifact_id, &artifact.disk_path, artifact.has_blob, session, &mapping).await {
            Ok(outcome) => Ok(outcome),
            Err(classified) => self.handle_failure(artifact_id, session, classified).await,
        }
    }

    async fn drive_submission(
        &self,
        artifact_id: uuid::Uuid,
        disk_path: &Option<String>,
        has_blob: bool,
        session: &StudentSession,
        mapping: &SubjectMapping,
    ) -> Result<SubmissionOutcome, LmsError> {
        // Step 2: load bytes.
        let bytes = self
            .storage
            .read(&StoredArtifactRef {
                id: artifact_id,
                disk_path: disk_path.clone(),
                has_blob,
            })
            .await
            .map_err(|e| LmsError::Unknown(format!("storage read failed: {e}")))?;

        // Step 3: decrypt LMS token.
        let token = session
            .decrypt_lms_token()
            .map_err(|e| LmsError::AuthInvalid(format!("could not decrypt stored LMS token: {e}")))?;

        // Step 4: upload file.
        let draft_item_id = self.lms.upload_file(&token, bytes, "submission.pdf").await?;
        sqlx::query("UPDATE artifacts SET draft_item_id = $1 WHERE id = $2")
            .bind(draft_item_id)
            .bind(artifact_id)
            .execute(self.pool())
            .await
            .map_err(|e| LmsError::Unknown(format!("failed to persist draft_item_id: {e}")))?;
        append_transaction_log(self.pool(), artifact_id, "UPLOADED")
            .await
            .map_err(|e| LmsError::Unknown(e.to_string()))?;

        // Step 5: save submission.
        self.lms
            .save_submission(&token, mapping.moodle_assignment_id, draft_item_id)
            .await?;
        append_transaction_log(self.pool(), artifact_id, "SAVED")
            .await
            .map_err(|e| LmsError::Unknown(e.to_string()))?;

        // Step 6: submit for grading.
        let submission_id = self
            .lms
            .submit_for_grading(&token, mapping.moodle_assignment_id)
            .await?;

        // Step 7: terminal success.
        sqlx::query(
            "UPDATE artifacts SET workflow_status = 'SUBMITTED_TO_LMS', submission_id = $1, completed_at = NOW()
             WHERE id = $2",
        )
        .bind(submission_id)
        .bind(artifact_id)
        .execute(self.pool())
        .await
        .map_err(|e| LmsError::Unknown(format!("failed to persist terminal state: {e}")))?;
        append_transaction_log(self.pool(), artifact_id, "SUBMITTED")
            .await
            .map_err(|e| LmsError::Unknown(e.to_string()))?;

        crate::audit::record(
            self.pool(),
            "SUBMIT_SUCCESS",
            "student",
            &session.moodle_username,
            &artifact_id.to_string(),
            serde_json::json!({"submission_id": submission_id}),
            "OK",
        )
        .await
        .map_err(|e| LmsError::Unknown(e.to_string()))?;

        Ok(SubmissionOutcome { submission_id })
    }

    /// Classifies an LMS failure and dispatches per the error-kind table:
    /// transient/authz/unknown failures requeue with backoff, payload
    /// rejection is terminal and notifies staff, an invalid token is
    /// terminal and the session is deleted so the student must log back in.
    async fn handle_failure(
        &self,
        artifact_id: uuid::Uuid,
        session: &StudentSession,
        classified: LmsError,
    ) -> Result<SubmissionOutcome, AppError> {
        let retry_count: i32 = sqlx::query_scalar(
            "UPDATE artifacts SET workflow_status = 'FAILED', retry_count = retry_count + 1, error_message = $1
             WHERE id = $2
             RETURNING retry_count",
        )
        .bind(classified.to_string())
        .bind(artifact_id)
        .fetch_one(self.pool())
        .await?;

        append_transaction_log(self.pool(), artifact_id, &format!("FAILED: {classified}")).await?;

        crate::audit::record(
            self.pool(),
            "SUBMIT_FAIL",
            "student",
            &session.moodle_username,
            &artifact_id.to_string(),
            serde_json::json!({"kind": classified_kind(&classified)}),
            "FAIL",
        )
        .await?;

        match &classified {
            LmsError::Transient(_) | LmsError::Authz(_) | LmsError::Unknown(_) => {
                if retry_count < MAX_RETRY_COUNT {
                    enqueue_retry(self.pool(), artifact_id, &session.session_id, retry_count).await?;
                }
                Err(AppError::upstream_transient(classified.to_string()))
            }
            LmsError::PayloadReject(_) => {
                self.notifier
                    .notify(
                        NotifyKind::SubmissionFailedTerminal,
                        &session.moodle_username,
                        serde_json::json!({"artifact_id": artifact_id, "reason": classified.to_string()}),
                    )
                    .await
                    .ok();
                Err(AppError::upstream_reject(classified.to_string()))
            }
            LmsError::AuthInvalid(_) => {
                crate::auth::student::logout(self.pool(), &session.session_id).await.ok();
                Err(AppError::auth_invalid(classified.to_string()))
            }
        }
    }
}

fn classified_kind(err: &LmsError) -> &'static str {
    match err {
        LmsError::Transient(_) => "UPSTREAM_TRANSIENT",
        LmsError::AuthInvalid(_) => "AUTH_INVALID",
        LmsError::Authz(_) => "AUTHZ",
        LmsError::PayloadReject(_) => "UPSTREAM_REJECT",
        LmsError::Unknown(_) => "INTERNAL",
    }
}

async fn fetch_active_mapping(
    pool: &PgPool,
    subject_code: &str,
    exam_type: examcore_common::model::ExamType,
) -> Result<Option<SubjectMapping>, AppError> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT moodle_course_id, moodle_assignment_id FROM subject_mappings
         WHERE subject_code = $1 AND exam_type = $2 AND is_active = true",
    )
    .bind(subject_code)
    .bind(exam_type.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(moodle_course_id, moodle_assignment_id)| SubjectMapping {
        subject_code: subject_code.to_string(),
        exam_type,
        moodle_course_id,
        moodle_assignment_id,
        is_active: true,
    }))
}

async fn mapped_register(pool: &PgPool, moodle_username: &str) -> Result<String, AppError> {
    sqlx::query_scalar("SELECT register_number FROM username_register_map WHERE moodle_username = $1")
        .bind(moodle_username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("no register number mapped for this student"))
}

/// Appends one entry to `artifacts.transaction_log`, a JSON array column.
async fn append_transaction_log(pool: &PgPool, artifact_id: uuid::Uuid, step: &str) -> Result<(), AppError> {
    let entry = serde_json::json!({"step": step, "at": Utc::now()});
    sqlx::query("UPDATE artifacts SET transaction_log = transaction_log || $1::jsonb WHERE id = $2")
        .bind(entry)
        .bind(artifact_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Inserts a `submission_queue` row with exponential backoff, capped at an
/// hour, per the retry schedule in the component design. Carries the
/// session id along so the retry worker can re-authenticate as the same
/// student without needing an interactive request.
async fn enqueue_retry(
    pool: &PgPool,
    artifact_id: uuid::Uuid,
    session_id: &str,
    retry_count: i32,
) -> Result<(), AppError> {
    let backoff_secs = 2i64.saturating_pow(retry_count.max(0) as u32).min(3600);
    let next_attempt_at: DateTime<Utc> = Utc::now() + chrono::Duration::seconds(backoff_secs);
    sqlx::query(
        "INSERT INTO submission_queue (artifact_id, session_id, status, retry_count, next_attempt_at)
         VALUES ($1, $2, 'pending', $3, $4)",
    )
    .bind(artifact_id)
    .bind(session_id)
    .bind(retry_count)
    .bind(next_attempt_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classified_kind_matches_error_taxonomy() {
        assert_eq!(classified_kind(&LmsError::Transient("x".into())), "UPSTREAM_TRANSIENT");
        assert_eq!(classified_kind(&LmsError::AuthInvalid("x".into())), "AUTH_INVALID");
        assert_eq!(classified_kind(&LmsError::PayloadReject("x".into())), "UPSTREAM_REJECT");
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(2i64.saturating_pow(1).min(3600), 2);
        assert_eq!(2i64.saturating_pow(2).min(3600), 4);
        assert_eq!(2i64.saturating_pow(20).min(3600), 3600);
    }
}
