//! Asynchronous 3D-model generation provider.
//!
//! Submission returns a provider-side job id; the caller polls
//! [`ModelProvider::query_status`] until the task reaches `Done` or `Fail`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;

/// Provider-side task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelTaskState {
    Wait,
    Run,
    Done,
    Fail,
}

/// One output file of a finished model task.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelResultFile {
    pub url: String,
    #[serde(rename = "type")]
    pub file_type: String,
    #[serde(rename = "previewImageUrl")]
    pub preview_image_url: Option<String>,
}

/// Snapshot of a provider task as returned by a status query.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelTaskStatus {
    pub status: ModelTaskState,
    #[serde(rename = "resultFiles", default)]
    pub result_files: Vec<ModelResultFile>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(rename = "errorCode")]
    pub error_code: Option<i32>,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Submit a generation task for the given source image. Returns the
    /// provider's job id for subsequent status queries.
    async fn submit(&self, image_url: &str) -> Result<String, ProviderError>;

    async fn query_status(&self, provider_job_id: &str) -> Result<ModelTaskStatus, ProviderError>;
}

/// HTTP implementation against the model provider's task API.
pub struct HttpModelProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "jobId")]
    job_id: Option<String>,
}

impl HttpModelProvider {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_key,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn submit(&self, image_url: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/tasks", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "imageUrl": image_url }))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: SubmitResponse = response.json().await?;
        body.job_id.ok_or(ProviderError::MalformedResponse("jobId"))
    }

    async fn query_status(&self, provider_job_id: &str) -> Result<ModelTaskStatus, ProviderError> {
        let url = format!("{}/v1/tasks/{provider_job_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_deserializes_provider_wire_shape() {
        let status: ModelTaskStatus = serde_json::from_str(
            r#"{
                "status": "DONE",
                "resultFiles": [
                    {"url": "https://x/model.zip", "type": "OBJ", "previewImageUrl": "https://x/p.png"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(status.status, ModelTaskState::Done);
        assert_eq!(status.result_files.len(), 1);
        assert_eq!(status.result_files[0].file_type, "OBJ");
        assert!(status.error_message.is_none());
    }

    #[test]
    fn failure_carries_message_and_code() {
        let status: ModelTaskStatus = serde_json::from_str(
            r#"{"status": "FAIL", "errorMessage": "quota exceeded", "errorCode": 429}"#,
        )
        .unwrap();
        assert_eq!(status.status, ModelTaskState::Fail);
        assert_eq!(status.error_message.as_deref(), Some("quota exceeded"));
        assert_eq!(status.error_code, Some(429));
        assert!(status.result_files.is_empty());
    }
}
