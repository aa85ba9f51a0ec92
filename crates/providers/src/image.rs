//! Image generation provider.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;

/// Generates candidate images from a text prompt.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Returns one URL per generated image, in generation order.
    async fn generate_images(&self, prompt: &str, count: u32) -> Result<Vec<String>, ProviderError>;
}

/// HTTP implementation against an OpenAI-compatible image endpoint.
pub struct HttpImageProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerationsResponse {
    data: Vec<GenerationsItem>,
}

#[derive(Deserialize)]
struct GenerationsItem {
    url: Option<String>,
}

impl HttpImageProvider {
    /// * `base_url` - HTTP base URL without trailing slash, e.g.
    ///   `https://api.example.com`.
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    async fn generate_images(&self, prompt: &str, count: u32) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/v1/images/generations", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "prompt": prompt,
                "n": count,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerationsResponse = response.json().await?;
        let urls: Vec<String> = body.data.into_iter().filter_map(|item| item.url).collect();
        if urls.is_empty() {
            return Err(ProviderError::MalformedResponse("data[].url"));
        }
        Ok(urls)
    }
}
