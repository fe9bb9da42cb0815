//! services/api/src/adapters/memory_store.rs
//!
//! A `FavoriteStore` that keeps favorites in process memory. Used when no
//! database is configured; favorites are lost when the service stops.

use async_trait::async_trait;
use logosnap_core::{FavoriteEntry, FavoriteStore, LogoId, PortResult};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryFavoriteStore {
    entries: RwLock<Vec<FavoriteEntry>>,
}

impl InMemoryFavoriteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FavoriteStore for InMemoryFavoriteStore {
    async fn persist_favorite(&self, entry: &FavoriteEntry) -> PortResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id() == entry.id()) {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    async fn remove_favorite_persisted(&self, id: LogoId) -> PortResult<bool> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id() != id);
        Ok(entries.len() != before)
    }

    async fn list_persisted_favorites(&self) -> PortResult<Vec<FavoriteEntry>> {
        Ok(self.entries.read().await.clone())
    }
}
