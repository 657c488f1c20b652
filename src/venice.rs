use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::models::{ImageFormat, ImageGenerationParams, ImageGenerationResponse};

#[derive(Debug, Error)]
pub enum VeniceError {
    /// Non-success status from Venice; `details` is the best-effort-parsed
    /// error body, `None` when it was not valid JSON.
    #[error("Venice API error: status {status}")]
    Api { status: u16, details: Option<Value> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid Venice response: {0}")]
    Decode(String),
}

pub struct VeniceClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl VeniceClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("VENICE_API_BASE")
            .unwrap_or_else(|_| "https://api.venice.ai/api/v1".to_string());
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self { client: Client::new(), api_key, base_url }
    }

    /// Forwards the generation request verbatim with our bearer credential
    /// and normalizes the returned images so every entry is directly
    /// displayable.
    pub async fn generate(
        &self,
        params: &ImageGenerationParams,
    ) -> Result<ImageGenerationResponse, VeniceError> {
        let url = format!("{}/image/generate", self.base_url.trim_end_matches('/'));
        info!("forwarding generation request for model '{}'", params.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(params)
            .send()
            .await
            .map_err(|e| VeniceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // best-effort parse; an unparsable body degrades to None
            let details = response.json::<Value>().await.ok();
            error!("Venice returned status {}", status);
            return Err(VeniceError::Api { status: status.as_u16(), details });
        }

        let mut data: ImageGenerationResponse = response
            .json()
            .await
            .map_err(|e| VeniceError::Decode(e.to_string()))?;

        let format = params.format.unwrap_or_default();
        for image in &mut data.images {
            *image = normalize_image(image, format);
        }
        info!(
            "generation {} complete: {} image(s), total {}ms",
            data.id,
            data.images.len(),
            data.timing.total
        );
        Ok(data)
    }
}

/// Venice returns bare base64 image data. Entries that are already an
/// absolute URL or a data URI pass through; anything else gets a data-URI
/// prefix using the requested output format.
pub fn normalize_image(image: &str, format: ImageFormat) -> String {
    if image.starts_with("http") || image.starts_with("data:image/") {
        image.to_string()
    } else {
        format!("data:image/{};base64,{}", format.as_str(), image)
    }
}
