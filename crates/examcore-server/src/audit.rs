//! Append-only audit trail. Every mutating handler and every orchestrator
//! step writes one row here naming the action it performed.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub action: String,
    pub actor_type: String,
    pub actor_id: String,
    pub target: String,
    pub request_payload: serde_json::Value,
    pub result: String,
    pub created_at: DateTime<Utc>,
}

/// Inserts one audit row. Generic over `sqlx::PgExecutor` so callers can pass
/// either a pool or an open transaction, keeping the audit write inside the
/// same transaction as the mutation it describes when one is in flight.
pub async fn record<'c, E>(
    executor: E,
    action: &str,
    actor_type: &str,
    actor_id: &str,
    target: &str,
    request_payload: serde_json::Value,
    result: &str,
) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        "INSERT INTO audit_log (action, actor_type, actor_id, target, request_payload, result, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, NOW())",
    )
    .bind(action)
    .bind(actor_type)
    .bind(actor_id)
    .bind(target)
    .bind(request_payload)
    .bind(result)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_with_expected_fields() {
        let entry = AuditEntry {
            action: "UPLOAD".to_string(),
            actor_type: "staff".to_string(),
            actor_id: "7".to_string(),
            target: "artifact:abc".to_string(),
            request_payload: serde_json::json!({"filename": "x.pdf"}),
            result: "OK".to_string(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["action"], "UPLOAD");
        assert_eq!(value["result"], "OK");
    }
}
