//! Periodic background task that re-enters submission for queued retries.
//! Coexists safely with concurrent interactive submissions because the
//! orchestrator's step-1 conditional update is the only thing that can move
//! an artifact into `SUBMITTING`.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use super::SubmissionOrchestrator;
use crate::auth::student::StudentSession;

const MAX_RETRY_COUNT: i32 = 5;

struct DueRetry {
    artifact_id: uuid::Uuid,
    session_id: String,
}

/// Spawns the retry loop and returns its join handle so callers (tests,
/// graceful shutdown) can await or abort it.
pub fn spawn(
    orchestrator: Arc<SubmissionOrchestrator>,
    db: PgPool,
    encryption_key: [u8; 32],
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = run_once(&orchestrator, &db, encryption_key).await {
                tracing::warn!("retry worker pass failed: {e}");
            }
        }
    })
}

async fn run_once(
    orchestrator: &SubmissionOrchestrator,
    db: &PgPool,
    encryption_key: [u8; 32],
) -> Result<(), sqlx::Error> {
    let due = fetch_due(db).await?;
    for retry in due {
        match crate::auth::student::lookup_session(db, &retry.session_id, encryption_key).await {
            Ok(session) => {
                if let Err(e) = orchestrator.submit(retry.artifact_id, &session).await {
                    tracing::debug!(artifact_id = %retry.artifact_id, "retry attempt failed: {e}");
                }
            }
            Err(_) => {
                abandon(db, retry.artifact_id).await?;
            }
        }
    }
    Ok(())
}

async fn fetch_due(db: &PgPool) -> Result<Vec<DueRetry>, sqlx::Error> {
    let rows: Vec<(uuid::Uuid, String)> = sqlx::query_as(
        "SELECT artifact_id, session_id
         FROM submission_queue
         WHERE status = 'pending' AND next_attempt_at <= NOW() AND retry_count < $1
         ORDER BY next_attempt_at
         LIMIT 100",
    )
    .bind(MAX_RETRY_COUNT)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(artifact_id, session_id)| DueRetry { artifact_id, session_id })
        .collect())
}

async fn abandon(db: &PgPool, artifact_id: uuid::Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE submission_queue SET status = 'abandoned' WHERE artifact_id = $1 AND status = 'pending'")
        .bind(artifact_id)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_retry_count_matches_orchestrator_cap() {
        assert_eq!(MAX_RETRY_COUNT, 5);
    }
}
