use std::collections::VecDeque;
use std::sync::Mutex;

use examcore_common::model::ExamType;

use super::{ExtractionClient, ExtractionOutcome};

/// Scriptable fake extraction client: each call pops the next queued
/// outcome, or falls back to the configured default.
#[derive(Default)]
pub struct MockExtractionClient {
    queue: Mutex<VecDeque<ExtractionOutcome>>,
}

impl MockExtractionClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: ExtractionOutcome) {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(outcome);
    }
}

#[async_trait::async_trait]
impl ExtractionClient for MockExtractionClient {
    async fn infer(&self, _bytes: &[u8], _declared_exam_type: ExamType) -> anyhow::Result<ExtractionOutcome> {
        Ok(self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or(ExtractionOutcome::Degraded(Default::default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_scripted_outcome_then_defaults_to_degraded() {
        let client = MockExtractionClient::new();
        client.push(ExtractionOutcome::Inferred {
            register_number: "212222240047".to_string(),
            register_confidence: 0.93,
            subject_code: "19AI405".to_string(),
            subject_confidence: 0.88,
            suggested_filename: None,
        });

        let first = client.infer(b"bytes", ExamType::Cia1).await.unwrap();
        assert!(first.is_high_confidence());

        let second = client.infer(b"bytes", ExamType::Cia1).await.unwrap();
        assert!(matches!(second, ExtractionOutcome::Degraded(_)));
    }
}
