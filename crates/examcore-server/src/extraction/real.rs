use examcore_common::model::ExamType;
use examcore_common::parsing::PartialIdentity;
use serde::Deserialize;

use super::{ExtractionClient, ExtractionOutcome};

const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);
const BOUNDARY: &str = "examcore-extract-boundary";

#[derive(Debug, Deserialize)]
struct InferResponse {
    register_number: Option<String>,
    register_confidence: Option<f64>,
    subject_code: Option<String>,
    subject_confidence: Option<f64>,
    suggested_filename: Option<String>,
}

pub struct HfSpaceExtractionClient {
    http: reqwest::Client,
    base_url: String,
}

impl HfSpaceExtractionClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("examcore-server")
            .timeout(TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

fn build_body(bytes: &[u8], exam_type: ExamType) -> (Vec<u8>, String) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"exam_type\"\r\n\r\n{exam_type}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan\"\r\nContent-Type: application/octet-stream\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (body, format!("multipart/form-data; boundary={BOUNDARY}"))
}

#[async_trait::async_trait]
impl ExtractionClient for HfSpaceExtractionClient {
    async fn infer(&self, bytes: &[u8], declared_exam_type: ExamType) -> anyhow::Result<ExtractionOutcome> {
        let (body, content_type) = build_body(bytes, declared_exam_type);
        let url = format!("{}/infer", self.base_url);

        let outcome = async {
            let resp = self
                .http
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body)
                .send()
                .await?
                .error_for_status()?;
            resp.json::<InferResponse>().await
        }
        .await;

        let parsed = match outcome {
            Ok(parsed) => parsed,
            Err(e) => {
                // This client only sees bytes, not the original filename, so it can't
                // run the flexible filename parser itself; callers merge this empty
                // result with their own `parsing::parse_flexible(filename)` call.
                tracing::warn!(error = %e, "remote extraction call failed, falling back to filename parsing");
                return Ok(ExtractionOutcome::Degraded(PartialIdentity::default()));
            }
        };

        let (Some(register_number), Some(register_confidence), Some(subject_code), Some(subject_confidence)) = (
            parsed.register_number,
            parsed.register_confidence,
            parsed.subject_code,
            parsed.subject_confidence,
        ) else {
            tracing::warn!("remote extraction returned an incomplete response, falling back");
            return Ok(ExtractionOutcome::Degraded(PartialIdentity::default()));
        };

        Ok(ExtractionOutcome::Inferred {
            register_number,
            register_confidence,
            subject_code,
            subject_confidence,
            suggested_filename: parsed.suggested_filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_body_includes_exam_type_and_file_part() {
        let (body, content_type) = build_body(b"%PDF-1.4", ExamType::Cia2);
        assert!(content_type.contains("boundary="));
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"exam_type\""));
        assert!(text.contains("CIA2"));
        assert!(text.contains("name=\"file\""));
    }
}
