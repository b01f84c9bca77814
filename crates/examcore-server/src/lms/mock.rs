use std::collections::VecDeque;
use std::sync::Mutex;

use super::{DraftItemId, LmsClient, LmsError, MoodleUser, SiteInfo, SubmissionId};

/// Scriptable fake LMS client for orchestrator tests. Each method pulls its
/// next result off a queue; an empty queue falls back to a fixed default
/// success so tests that don't care about a given call don't need to script
/// it.
#[derive(Default)]
pub struct MockLmsClient {
    token_exchange: Mutex<VecDeque<Result<String, LmsError>>>,
    upload_file: Mutex<VecDeque<Result<DraftItemId, LmsError>>>,
    save_submission: Mutex<VecDeque<Result<(), LmsError>>>,
    submit_for_grading: Mutex<VecDeque<Result<SubmissionId, LmsError>>>,
}

impl MockLmsClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_token_exchange(&self, result: Result<String, LmsError>) {
        self.token_exchange
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(result);
    }

    pub fn push_upload_file(&self, result: Result<DraftItemId, LmsError>) {
        self.upload_file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(result);
    }

    pub fn push_save_submission(&self, result: Result<(), LmsError>) {
        self.save_submission
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(result);
    }

    pub fn push_submit_for_grading(&self, result: Result<SubmissionId, LmsError>) {
        self.submit_for_grading
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(result);
    }
}

fn pop_or<T: Clone>(queue: &Mutex<VecDeque<Result<T, LmsError>>>, default: T) -> Result<T, LmsError> {
    queue
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .pop_front()
        .unwrap_or(Ok(default))
}

#[async_trait::async_trait]
impl LmsClient for MockLmsClient {
    async fn token_exchange(&self, _username: &str, _password: &str) -> Result<String, LmsError> {
        pop_or(&self.token_exchange, "mock-ws-token".to_string())
    }

    async fn site_info(&self, _token: &str) -> Result<SiteInfo, LmsError> {
        Ok(SiteInfo {
            userid: 1,
            username: "mock-student".to_string(),
            fullname: "Mock Student".to_string(),
        })
    }

    async fn user_by_field(&self, _token: &str, _field: &str, value: &str) -> Result<MoodleUser, LmsError> {
        Ok(MoodleUser {
            id: 1,
            username: value.to_string(),
            email: None,
        })
    }

    async fn upload_file(&self, _token: &str, _bytes: Vec<u8>, _filename: &str) -> Result<DraftItemId, LmsError> {
        pop_or(&self.upload_file, 100)
    }

    async fn save_submission(&self, _token: &str, _assignment_id: i64, _item_id: DraftItemId) -> Result<(), LmsError> {
        pop_or(&self.save_submission, ())
    }

    async fn submit_for_grading(&self, _token: &str, _assignment_id: i64) -> Result<SubmissionId, LmsError> {
        pop_or(&self.submit_for_grading, 900)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_calls_succeed_with_fixed_values() {
        let client = MockLmsClient::new();
        assert_eq!(client.token_exchange("u", "p").await.unwrap(), "mock-ws-token");
        assert_eq!(client.upload_file("t", vec![], "f.pdf").await.unwrap(), 100);
        assert!(client.save_submission("t", 1, 100).await.is_ok());
        assert_eq!(client.submit_for_grading("t", 1).await.unwrap(), 900);
    }

    #[tokio::test]
    async fn scripted_failure_then_success() {
        let client = MockLmsClient::new();
        client.push_save_submission(Err(LmsError::Transient("network blip".to_string())));
        client.push_save_submission(Ok(()));

        assert!(client.save_submission("t", 1, 100).await.is_err());
        assert!(client.save_submission("t", 1, 100).await.is_ok());
    }
}
