//! services/api/src/adapters/placeholder_image.rs
//!
//! A stand-in image generator that hands out random placeholder pictures.
//! Useful for local development and demos where no image model is configured.

use async_trait::async_trait;
use logosnap_core::{GeneratedImage, ImageGenerationService, PortResult};
use tracing::debug;
use uuid::Uuid;

const DEFAULT_BASE_URL: &str = "https://picsum.photos/512/512";

#[derive(Clone)]
pub struct PlaceholderImageAdapter {
    base_url: String,
}

impl PlaceholderImageAdapter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for PlaceholderImageAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageGenerationService for PlaceholderImageAdapter {
    /// Ignores the prompt; every call gets a distinct random image.
    async fn generate_image(&self, prompt: &str) -> PortResult<GeneratedImage> {
        let image_id = Uuid::new_v4().simple().to_string();
        let url = format!("{}?random={}", self.base_url, &image_id[..8]);
        debug!("Placeholder image for '{}': {}", prompt, url);
        Ok(GeneratedImage { url })
    }
}
