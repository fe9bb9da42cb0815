//! services/api/src/adapters/openai_image.rs
//!
//! This module contains the adapter for OpenAI's image generation API.
//! It implements the `ImageGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateImageRequestArgs, Image, ImageModel, ImageResponseFormat, ImageSize},
    Client,
};
use async_trait::async_trait;
use logosnap_core::{GeneratedImage, ImageGenerationService, PortError, PortResult};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `ImageGenerationService` port using the OpenAI Images API.
#[derive(Clone)]
pub struct OpenAiImageAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiImageAdapter {
    /// Creates a new `OpenAiImageAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `ImageGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageGenerationService for OpenAiImageAdapter {
    /// Requests a single square image and returns the URL OpenAI hosts it under.
    async fn generate_image(&self, prompt: &str) -> PortResult<GeneratedImage> {
        let request = CreateImageRequestArgs::default()
            .prompt(prompt)
            .model(ImageModel::Other(self.model.clone()))
            .n(1)
            .size(ImageSize::S1024x1024)
            .response_format(ImageResponseFormat::Url)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .images()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let image = response
            .data
            .first()
            .ok_or_else(|| PortError::Unexpected("No image generated".to_string()))?;

        match image.as_ref() {
            Image::Url { url, .. } => {
                debug!("OpenAI generated image at {}", url);
                Ok(GeneratedImage { url: url.clone() })
            }
            _ => Err(PortError::Unexpected(
                "OpenAI returned inline image data instead of a URL".to_string(),
            )),
        }
    }
}
