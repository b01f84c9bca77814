use serde_json::Value;

use super::{DraftItemId, LmsClient, LmsError, MoodleUser, SiteInfo, SubmissionId, classify_errorcode};

const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
const BOUNDARY: &str = "examcore-multipart-boundary";

pub struct MoodleClient {
    http: reqwest::Client,
    base_url: String,
}

impl MoodleClient {
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

    fn rest_url(&self) -> String {
        format!("{}/webservice/rest/server.php", self.base_url)
    }

    async fn call_rest(&self, wstoken: &str, wsfunction: &str, extra: &[(&str, &str)]) -> Result<Value, LmsError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("wstoken", wstoken),
            ("wsfunction", wsfunction),
            ("moodlewsrestformat", "json"),
        ];
        form.extend_from_slice(extra);

        let resp = self
            .http
            .post(self.rest_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| LmsError::Transient(e.to_string()))?;

        let body: Value = resp.json().await.map_err(|e| LmsError::Transient(e.to_string()))?;
        classify_response(&body)?;
        Ok(body)
    }
}

/// Parses a Moodle response body for an `{exception, errorcode, message}`
/// shape. HTTP 200 is never treated as sufficient on its own.
fn classify_response(body: &Value) -> Result<(), LmsError> {
    if let Some(errorcode) = body.get("errorcode").and_then(Value::as_str) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string();
        return Err(classify_errorcode(errorcode, &message));
    }
    if body.get("exception").is_some() {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified exception")
            .to_string();
        return Err(LmsError::Unknown(message));
    }
    Ok(())
}

/// Builds a `multipart/form-data` body manually, with an optional filename
/// on the last part. `reqwest`'s streaming multipart has shown truncation
/// past two parts against this LMS, so the body is assembled as one
/// `Content-Length`-known buffer instead.
fn build_upload_body(token: &str, bytes: &[u8], filename: &str) -> (Vec<u8>, String) {
    let mut body = Vec::new();

    for (name, value) in [("token", token), ("filearea", "draft")] {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }

    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file_1\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (body, format!("multipart/form-data; boundary={BOUNDARY}"))
}

#[async_trait::async_trait]
impl LmsClient for MoodleClient {
    async fn token_exchange(&self, username: &str, password: &str) -> Result<String, LmsError> {
        let url = format!("{}/login/token.php", self.base_url);
        let resp = self
            .http
            .post(url)
            .form(&[
                ("username", username),
                ("password", password),
                ("service", "moodle_mobile_app"),
            ])
            .send()
            .await
            .map_err(|e| LmsError::Transient(e.to_string()))?;

        let body: Value = resp.json().await.map_err(|e| LmsError::Transient(e.to_string()))?;
        classify_response(&body)?;
        body.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LmsError::Unknown("token_exchange response missing token field".to_string()))
    }

    async fn site_info(&self, token: &str) -> Result<SiteInfo, LmsError> {
        let body = self.call_rest(token, "core_webservice_get_site_info", &[]).await?;
        serde_json::from_value(body).map_err(|e| LmsError::Unknown(format!("malformed site_info response: {e}")))
    }

    async fn user_by_field(&self, token: &str, field: &str, value: &str) -> Result<MoodleUser, LmsError> {
        let body = self
            .call_rest(
                token,
                "core_user_get_users_by_field",
                &[("field", field), ("values[0]", value)],
            )
            .await?;
        let mut users: Vec<MoodleUser> =
            serde_json::from_value(body).map_err(|e| LmsError::Unknown(format!("malformed user_by_field response: {e}")))?;
        users
            .pop()
            .ok_or_else(|| LmsError::Unknown("user_by_field returned no users".to_string()))
    }

    async fn upload_file(&self, token: &str, bytes: Vec<u8>, filename: &str) -> Result<DraftItemId, LmsError> {
        let (body, content_type) = build_upload_body(token, &bytes, filename);
        let url = format!("{}/webservice/upload.php", self.base_url);

        let resp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| LmsError::Transient(e.to_string()))?;

        let parsed: Value = resp.json().await.map_err(|e| LmsError::Transient(e.to_string()))?;
        classify_response(&parsed)?;

        let entries = parsed
            .as_array()
            .ok_or_else(|| LmsError::Unknown("upload.php did not return an array".to_string()))?;
        let item_id = entries
            .first()
            .and_then(|entry| entry.get("itemid"))
            .and_then(Value::as_i64)
            .ok_or_else(|| LmsError::Unknown("upload.php response missing itemid".to_string()))?;
        Ok(item_id)
    }

    async fn save_submission(&self, token: &str, assignment_id: i64, item_id: DraftItemId) -> Result<(), LmsError> {
        let assignment_id_s = assignment_id.to_string();
        let item_id_s = item_id.to_string();
        self.call_rest(
            token,
            "mod_assign_save_submission",
            &[
                ("assignmentid", assignment_id_s.as_str()),
                ("plugindata[files_filemanager]", item_id_s.as_str()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn submit_for_grading(&self, token: &str, assignment_id: i64) -> Result<SubmissionId, LmsError> {
        let assignment_id_s = assignment_id.to_string();
        let body = self
            .call_rest(
                token,
                "mod_assign_submit_for_grading",
                &[("assignmentid", assignment_id_s.as_str()), ("acceptsubmissionstatement", "1")],
            )
            .await?;
        body.get("submissionid")
            .and_then(Value::as_i64)
            .ok_or_else(|| LmsError::Unknown("submit_for_grading response missing submissionid".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_response_passes_through_success() {
        let body = serde_json::json!({"userid": 1, "username": "alice"});
        assert!(classify_response(&body).is_ok());
    }

    #[test]
    fn classify_response_detects_errorcode() {
        let body = serde_json::json!({"errorcode": "invalidtoken", "message": "bad token"});
        assert!(matches!(classify_response(&body), Err(LmsError::AuthInvalid(_))));
    }

    #[test]
    fn classify_response_detects_exception() {
        let body = serde_json::json!({"exception": "moodle_exception", "message": "boom"});
        assert!(matches!(classify_response(&body), Err(LmsError::Unknown(_))));
    }

    #[test]
    fn build_upload_body_includes_filename_and_bytes() {
        let (body, content_type) = build_upload_body("tok", b"%PDF-1.4", "212222240047_19AI405.pdf");
        assert!(content_type.contains("boundary="));
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("filename=\"212222240047_19AI405.pdf\""));
        assert!(text.contains("name=\"token\""));
    }
}
