//! The data model, as plain records.
//!
//! These types carry `sqlx::FromRow`-compatible shapes (derived in
//! `examcore-server`, not here, to keep this crate decoupled from the DB
//! layer) but are defined once so parsing, storage, and the HTTP layer all
//! agree on field names.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamType {
    Cia1,
    Cia2,
    Cia3,
    Sem,
}

impl ExamType {
    pub const DEFAULT: Self = Self::Cia1;

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cia1 => "CIA1",
            Self::Cia2 => "CIA2",
            Self::Cia3 => "CIA3",
            Self::Sem => "SEM",
        }
    }
}

impl Default for ExamType {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown exam type: {0}")]
pub struct UnknownExamType(String);

impl FromStr for ExamType {
    type Err = UnknownExamType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CIA1" => Ok(Self::Cia1),
            "CIA2" => Ok(Self::Cia2),
            "CIA3" => Ok(Self::Cia3),
            "SEM" => Ok(Self::Sem),
            other => Err(UnknownExamType(other.to_string())),
        }
    }
}

/// Lifecycle states. Transitions are enforced by the
/// orchestrator and repository, never by this type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Pending,
    Submitting,
    SubmittedToLms,
    Failed,
    Superseded,
}

impl WorkflowStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Submitting => "SUBMITTING",
            Self::SubmittedToLms => "SUBMITTED_TO_LMS",
            Self::Failed => "FAILED",
            Self::Superseded => "SUPERSEDED",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown workflow status: {0}")]
pub struct UnknownWorkflowStatus(String);

impl FromStr for WorkflowStatus {
    type Err = UnknownWorkflowStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUBMITTING" => Ok(Self::Submitting),
            "SUBMITTED_TO_LMS" => Ok(Self::SubmittedToLms),
            "FAILED" => Ok(Self::Failed),
            "SUPERSEDED" => Ok(Self::Superseded),
            other => Err(UnknownWorkflowStatus(other.to_string())),
        }
    }
}

/// One scanned answer-paper record. Field names match the
/// `artifacts` table columns one-to-one so `sqlx::query_as!` in
/// `examcore-server` can map directly onto this struct's server-side twin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: uuid::Uuid,
    pub original_filename: String,
    pub canonical_filename: String,
    pub parsed_reg_no: String,
    pub parsed_subject_code: String,
    pub exam_type: ExamType,
    pub attempt_number: i32,
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub disk_path: Option<String>,
    pub has_blob: bool,
    pub moodle_user_id: Option<i64>,
    pub moodle_username: Option<String>,
    pub moodle_course_id: Option<i64>,
    pub moodle_assignment_id: Option<i64>,
    pub draft_item_id: Option<i64>,
    pub submission_id: Option<i64>,
    pub workflow_status: WorkflowStatus,
    pub idempotency_key: String,
    pub uploaded_by: String,
    pub auto_processed: bool,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub transaction_log: serde_json::Value,
    pub tombstoned: bool,
    pub uploaded_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// `(subject_code, exam_type) -> (course, assignment)` mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectMapping {
    pub subject_code: String,
    pub exam_type: ExamType,
    pub moodle_course_id: i64,
    pub moodle_assignment_id: i64,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_type_round_trips_through_str() {
        for s in ["CIA1", "CIA2", "CIA3", "SEM"] {
            let parsed: ExamType = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn exam_type_parse_is_case_insensitive() {
        assert_eq!("cia1".parse::<ExamType>().unwrap(), ExamType::Cia1);
    }

    #[test]
    fn exam_type_default_is_cia1() {
        assert_eq!(ExamType::default(), ExamType::Cia1);
    }

    #[test]
    fn unknown_exam_type_is_rejected() {
        assert!("CIA4".parse::<ExamType>().is_err());
    }

    #[test]
    fn workflow_status_round_trips_through_str() {
        for s in [
            "PENDING",
            "SUBMITTING",
            "SUBMITTED_TO_LMS",
            "FAILED",
            "SUPERSEDED",
        ] {
            let parsed: WorkflowStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }
}
