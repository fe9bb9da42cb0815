//! services/api/src/adapters/blob.rs
//!
//! Implements the `BlobStorageService` port: fetching generated images over HTTP,
//! serving them under revocable temporary URLs, and writing downloads to disk.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use logosnap_core::{BlobStorageService, PortError, PortResult, TempImageHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Path prefix under which temporary images are served by the web layer.
pub const TEMP_IMAGE_PREFIX: &str = "/images";

//=========================================================================================
// Temporary Image Registry
//=========================================================================================

/// In-memory registry behind the `/images/{key}` URLs.
#[derive(Default)]
pub struct TempImageStore {
    images: DashMap<String, Bytes>,
}

impl TempImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, data: Bytes) -> TempImageHandle {
        let key = Uuid::new_v4().to_string();
        self.images.insert(key.clone(), data);
        TempImageHandle {
            url: format!("{}/{}", TEMP_IMAGE_PREFIX, key),
            key,
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.images.get(key).map(|entry| entry.value().clone())
    }

    /// Returns whether anything was registered under `key`.
    pub fn revoke(&self, key: &str) -> bool {
        self.images.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct HttpBlobAdapter {
    client: reqwest::Client,
    temp_images: Arc<TempImageStore>,
    download_dir: PathBuf,
}

impl HttpBlobAdapter {
    pub fn new(client: reqwest::Client, temp_images: Arc<TempImageStore>, download_dir: PathBuf) -> Self {
        Self {
            client,
            temp_images,
            download_dir,
        }
    }

    /// Where a download named `filename` ends up. Only the final path component is kept.
    fn download_path(&self, filename: &str) -> PortResult<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| PortError::Unexpected(format!("Invalid download filename '{}'", filename)))?;
        Ok(self.download_dir.join(name))
    }
}

//=========================================================================================
// `BlobStorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl BlobStorageService for HttpBlobAdapter {
    async fn fetch_as_binary(&self, url: &str) -> PortResult<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to fetch {}: {}", url, e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(url.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| PortError::Unexpected(format!("Failed to fetch {}: {}", url, e)))?;

        let data = response
            .bytes()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to read {}: {}", url, e)))?;
        debug!("Fetched {} bytes from {}", data.len(), url);
        Ok(data)
    }

    fn create_temporary_url(&self, data: Bytes) -> TempImageHandle {
        self.temp_images.insert(data)
    }

    fn revoke_temporary_url(&self, handle: &TempImageHandle) {
        if self.temp_images.revoke(&handle.key) {
            debug!("Revoked temporary image {}", handle.url);
        }
    }

    async fn trigger_download(&self, data: Bytes, filename: &str) -> PortResult<()> {
        let path = self.download_path(filename)?;
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        info!("Saved download to {}", path.display());
        Ok(())
    }
}
