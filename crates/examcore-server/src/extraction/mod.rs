//! Remote AI extraction client: OCR-based metadata inference with graceful
//! fallback to filename parsing.

pub mod mock;
pub mod real;

use examcore_common::model::ExamType;
use examcore_common::parsing::PartialIdentity;

/// Confidence at or above which an inferred field is accepted without
/// manual review.
pub const CONFIDENCE_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The remote service was unreachable or returned nothing usable;
    /// callers fall back to whatever the filename parser recovered.
    Degraded(PartialIdentity),
    Inferred {
        register_number: String,
        register_confidence: f64,
        subject_code: String,
        subject_confidence: f64,
        suggested_filename: Option<String>,
    },
}

impl ExtractionOutcome {
    /// True when both confidences clear [`CONFIDENCE_THRESHOLD`].
    #[must_use]
    pub fn is_high_confidence(&self) -> bool {
        match self {
            Self::Degraded(_) => false,
            Self::Inferred {
                register_confidence,
                subject_confidence,
                ..
            } => *register_confidence >= CONFIDENCE_THRESHOLD && *subject_confidence >= CONFIDENCE_THRESHOLD,
        }
    }
}

#[async_trait::async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn infer(&self, bytes: &[u8], declared_exam_type: ExamType) -> anyhow::Result<ExtractionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_confidence_requires_both_fields_above_threshold() {
        let outcome = ExtractionOutcome::Inferred {
            register_number: "212222240047".to_string(),
            register_confidence: 0.93,
            subject_code: "19AI405".to_string(),
            subject_confidence: 0.88,
            suggested_filename: None,
        };
        assert!(outcome.is_high_confidence());
    }

    #[test]
    fn low_confidence_on_either_field_fails_gate() {
        let outcome = ExtractionOutcome::Inferred {
            register_number: "212222240047".to_string(),
            register_confidence: 0.93,
            subject_code: "19AI405".to_string(),
            subject_confidence: 0.5,
            suggested_filename: None,
        };
        assert!(!outcome.is_high_confidence());
    }

    #[test]
    fn degraded_is_never_high_confidence() {
        let outcome = ExtractionOutcome::Degraded(PartialIdentity::default());
        assert!(!outcome.is_high_confidence());
    }
}
