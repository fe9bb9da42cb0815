//! crates/logosnap_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage backend or serialization format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Opaque identifier of a generated logo.
pub type LogoId = Uuid;

/// Number of logos produced by one generation.
pub const BATCH_SIZE: usize = 4;

/// Builds the prompt sent to the image generator for the `index`-th logo (1-based).
pub fn augmented_prompt(prompt: &str, index: usize) -> String {
    format!(
        "{}. Logo design {}. Clean, professional, minimalist style.",
        prompt, index
    )
}

/// The raw result of one image-generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
}

/// A revocable URL under which a batch image is served while the batch is live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TempImageHandle {
    /// Lookup key inside the issuing blob adapter.
    pub key: String,
    pub url: String,
}

/// Handle to the data of a generated image.
#[derive(Debug, Clone)]
pub struct ImageRef {
    /// Where the generator published the image.
    pub source_url: String,
    /// Temporary display URL; `None` once the image only lives on as a favorite.
    pub display_url: Option<String>,
    pub data: Bytes,
}

/// One generated image result with its originating prompt.
#[derive(Debug, Clone)]
pub struct Logo {
    pub id: LogoId,
    pub image: ImageRef,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// A logo the user chose to keep beyond the lifetime of its batch.
#[derive(Debug, Clone)]
pub struct FavoriteEntry {
    pub logo: Logo,
    pub favorited_at: DateTime<Utc>,
}

impl FavoriteEntry {
    pub fn new(logo: Logo, favorited_at: DateTime<Utc>) -> Self {
        Self { logo, favorited_at }
    }

    pub fn id(&self) -> LogoId {
        self.logo.id
    }
}

/// The logos produced by one successful `generate` call.
#[derive(Debug, Clone)]
pub struct Batch {
    pub prompt: String,
    pub logos: Vec<Logo>,
}

/// Which screen the presentation layer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveView {
    #[default]
    Generate,
    Favorites,
}

/// A file ready to be handed to the user.
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub data: Bytes,
}

impl Download {
    pub fn filename_for(id: LogoId) -> String {
        format!("logosnap-logo-{}.png", id)
    }
}

/// Read-only view of a session, as rendered by the presentation layer.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub has_paid: bool,
    pub credits_remaining: u32,
    pub current_batch: Vec<Logo>,
    pub favorites_count: usize,
    pub favorites_capacity: usize,
    pub active_view: ActiveView,
    pub is_generating: bool,
}
