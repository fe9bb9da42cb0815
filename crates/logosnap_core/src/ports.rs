//! crates/logosnap_core/src/ports.rs
//!
//! Defines the service contracts (traits) the session controller depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete image generator, blob handling and storage.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{FavoriteEntry, GeneratedImage, LogoId, TempImageHandle};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    /// Produces one image for the given prompt and returns where it can be fetched.
    async fn generate_image(&self, prompt: &str) -> PortResult<GeneratedImage>;
}

#[async_trait]
pub trait BlobStorageService: Send + Sync {
    /// Downloads the image behind `url` into memory.
    async fn fetch_as_binary(&self, url: &str) -> PortResult<Bytes>;

    /// Registers image data under a temporary URL that stays valid until revoked.
    fn create_temporary_url(&self, data: Bytes) -> TempImageHandle;

    /// Releases a temporary URL. Revoking an unknown or already revoked handle is a no-op.
    fn revoke_temporary_url(&self, handle: &TempImageHandle);

    /// Hands the image data to the user under `filename`.
    async fn trigger_download(&self, data: Bytes, filename: &str) -> PortResult<()>;
}

#[async_trait]
pub trait FavoriteStore: Send + Sync {
    /// Returns `false` if the favorite was already stored.
    async fn persist_favorite(&self, entry: &FavoriteEntry) -> PortResult<bool>;

    /// Returns `false` if nothing was stored under `id`.
    async fn remove_favorite_persisted(&self, id: LogoId) -> PortResult<bool>;

    /// Lists stored favorites in the order they were favorited.
    async fn list_persisted_favorites(&self) -> PortResult<Vec<FavoriteEntry>>;
}
