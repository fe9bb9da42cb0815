//! crates/logosnap_core/src/session.rs
//!
//! The session state controller: the single owner of credits, the current batch
//! of generated logos and the favorites collection. Every mutation of a session
//! goes through [`SessionController`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    augmented_prompt, ActiveView, Batch, Download, FavoriteEntry, ImageRef, Logo, LogoId,
    SessionSnapshot, TempImageHandle, BATCH_SIZE,
};
use crate::favorites::{CapacityPolicy, CapacityReached, Favorites, MAX_FAVORITES};
use crate::ports::{BlobStorageService, FavoriteStore, ImageGenerationService, PortError};

/// Credits granted by one purchase unless configured otherwise.
pub const DEFAULT_CREDITS_PER_PURCHASE: u32 = 5;

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No credits remaining")]
    NoCredits,
    #[error("Prompt must not be empty")]
    EmptyPrompt,
    #[error("A generation is already in progress")]
    GenerationInProgress,
    #[error("Logo generation failed ({failed} of {} images): {source}", BATCH_SIZE)]
    Generation {
        failed: usize,
        #[source]
        source: PortError,
    },
    #[error("Favorites are full ({capacity}/{capacity}); remove a favorite first")]
    FavoritesFull { capacity: usize },
    #[error("Logo {0} not found")]
    LogoNotFound(LogoId),
    #[error(transparent)]
    Port(#[from] PortError),
}

impl From<CapacityReached> for SessionError {
    fn from(e: CapacityReached) -> Self {
        SessionError::FavoritesFull {
            capacity: e.capacity,
        }
    }
}

//=========================================================================================
// Configuration and Outcomes
//=========================================================================================

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub credits_per_purchase: u32,
    pub favorites_capacity: usize,
    pub capacity_policy: CapacityPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credits_per_purchase: DEFAULT_CREDITS_PER_PURCHASE,
            favorites_capacity: MAX_FAVORITES,
            capacity_policy: CapacityPolicy::Reject,
        }
    }
}

/// What a call to [`SessionController::toggle_favorite`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoriteToggle {
    Added { evicted: Option<LogoId> },
    Removed,
}

//=========================================================================================
// Controller
//=========================================================================================

struct SessionState {
    has_paid: bool,
    credits_remaining: u32,
    current_batch: Vec<Logo>,
    // Temporary URLs backing `current_batch`.
    batch_handles: Vec<TempImageHandle>,
    favorites: Favorites,
    active_view: ActiveView,
}

pub struct SessionController {
    generator: Arc<dyn ImageGenerationService>,
    blobs: Arc<dyn BlobStorageService>,
    store: Arc<dyn FavoriteStore>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    /// Held across a favorites change and the matching store write, so the store
    /// applies them in the same order as the in-memory collection.
    favorites_writes: Mutex<()>,
    generating: AtomicBool,
}

/// Clears the in-flight flag on every exit path of `generate`.
struct GenerationGuard<'a>(&'a AtomicBool);

impl<'a> GenerationGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::GenerationInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Temporary URLs issued for a batch that has not been committed yet.
/// Whatever is still tracked when this drops is revoked, including when the
/// `generate` future itself is dropped halfway through.
struct PendingHandles {
    blobs: Arc<dyn BlobStorageService>,
    handles: std::sync::Mutex<Vec<TempImageHandle>>,
}

impl PendingHandles {
    fn new(blobs: Arc<dyn BlobStorageService>) -> Self {
        Self {
            blobs,
            handles: std::sync::Mutex::new(Vec::with_capacity(BATCH_SIZE)),
        }
    }

    /// Issues a temporary URL for `data` and tracks it; returns the URL.
    fn issue(&self, data: Bytes) -> String {
        let handle = self.blobs.create_temporary_url(data);
        let url = handle.url.clone();
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        url
    }

    /// Hands the tracked handles over to the caller; nothing is revoked afterwards.
    fn disarm(mut self) -> Vec<TempImageHandle> {
        std::mem::take(self.handles.get_mut().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for PendingHandles {
    fn drop(&mut self) {
        let handles = self.handles.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !handles.is_empty() {
            debug!("Revoking {} uncommitted temporary images", handles.len());
        }
        for handle in handles.drain(..) {
            self.blobs.revoke_temporary_url(&handle);
        }
    }
}

impl SessionController {
    /// Creates an unpaid session with no credits, no batch and no favorites.
    pub fn new(
        generator: Arc<dyn ImageGenerationService>,
        blobs: Arc<dyn BlobStorageService>,
        store: Arc<dyn FavoriteStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            generator,
            blobs,
            store,
            config,
            state: Mutex::new(SessionState {
                has_paid: false,
                credits_remaining: 0,
                current_batch: Vec::new(),
                batch_handles: Vec::new(),
                favorites: Favorites::new(config.favorites_capacity, config.capacity_policy),
                active_view: ActiveView::default(),
            }),
            favorites_writes: Mutex::new(()),
            generating: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        self.snapshot_of(&state)
    }

    fn snapshot_of(&self, state: &SessionState) -> SessionSnapshot {
        SessionSnapshot {
            has_paid: state.has_paid,
            credits_remaining: state.credits_remaining,
            current_batch: state.current_batch.clone(),
            favorites_count: state.favorites.len(),
            favorites_capacity: state.favorites.capacity(),
            active_view: state.active_view,
            is_generating: self.generating.load(Ordering::Acquire),
        }
    }

    /// Loads previously persisted favorites into the session, oldest first, up to capacity.
    pub async fn restore_favorites(&self) -> Result<usize, SessionError> {
        let _writes = self.favorites_writes.lock().await;
        let persisted = self.store.list_persisted_favorites().await?;
        let mut state = self.state.lock().await;
        let mut restored = 0;
        for entry in persisted {
            let id = entry.id();
            if state.favorites.is_full() {
                warn!("Favorites are full; skipping persisted favorite {}", id);
                continue;
            }
            if !state.favorites.contains(id) && state.favorites.insert(entry).is_ok() {
                restored += 1;
            }
        }
        info!("Restored {} favorites from storage", restored);
        Ok(restored)
    }

    /// Simulated payment: marks the session paid and grants credits.
    pub async fn purchase(&self) -> SessionSnapshot {
        let mut state = self.state.lock().await;
        state.has_paid = true;
        state.credits_remaining = state
            .credits_remaining
            .saturating_add(self.config.credits_per_purchase);
        info!(
            "Purchase completed; {} credits remaining",
            state.credits_remaining
        );
        self.snapshot_of(&state)
    }

    /// Generates a new batch of logos for `prompt`, spending one credit.
    ///
    /// The batch only becomes visible when every image succeeded. On failure the
    /// credits and the current batch are left untouched.
    pub async fn generate(&self, prompt: &str) -> Result<Batch, SessionError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        let _guard = GenerationGuard::acquire(&self.generating)?;

        if self.state.lock().await.credits_remaining == 0 {
            warn!("Generation rejected: no credits remaining");
            return Err(SessionError::NoCredits);
        }

        info!("Generating {} logos for prompt '{}'", BATCH_SIZE, prompt);
        let pending = PendingHandles::new(self.blobs.clone());
        let results =
            join_all((1..=BATCH_SIZE).map(|i| self.produce_logo(prompt, i, &pending))).await;

        let mut logos = Vec::with_capacity(BATCH_SIZE);
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(logo) => logos.push(logo),
                Err(e) => failures.push(e),
            }
        }

        if !failures.is_empty() {
            drop(pending);
            let failed = failures.len();
            let source = failures.remove(0);
            error!(
                "Generation failed for prompt '{}': {} of {} images failed ({})",
                prompt, failed, BATCH_SIZE, source
            );
            return Err(SessionError::Generation { failed, source });
        }

        let stale_handles = {
            let mut state = self.state.lock().await;
            if state.credits_remaining == 0 {
                return Err(SessionError::NoCredits);
            }
            state.credits_remaining -= 1;
            state.current_batch = logos.clone();
            let stale = std::mem::replace(&mut state.batch_handles, pending.disarm());
            info!(
                "Generated new batch; {} credits remaining",
                state.credits_remaining
            );
            stale
        };
        self.revoke_all(&stale_handles);

        Ok(Batch {
            prompt: prompt.to_string(),
            logos,
        })
    }

    async fn produce_logo(
        &self,
        prompt: &str,
        index: usize,
        pending: &PendingHandles,
    ) -> Result<Logo, PortError> {
        let generated = self
            .generator
            .generate_image(&augmented_prompt(prompt, index))
            .await?;
        let data = self.blobs.fetch_as_binary(&generated.url).await?;
        let display_url = pending.issue(data.clone());

        Ok(Logo {
            id: Uuid::new_v4(),
            image: ImageRef {
                source_url: generated.url,
                display_url: Some(display_url),
                data,
            },
            prompt: prompt.to_string(),
            created_at: Utc::now(),
        })
    }

    fn revoke_all(&self, handles: &[TempImageHandle]) {
        for handle in handles {
            self.blobs.revoke_temporary_url(handle);
        }
    }

    /// Adds the logo to favorites, or removes it if it is already a favorite.
    pub async fn toggle_favorite(&self, id: LogoId) -> Result<FavoriteToggle, SessionError> {
        let _writes = self.favorites_writes.lock().await;
        let mut state = self.state.lock().await;

        if state.favorites.remove(id).is_some() {
            drop(state);
            info!("Removed logo {} from favorites", id);
            self.unpersist(id).await;
            return Ok(FavoriteToggle::Removed);
        }

        let mut logo = state
            .current_batch
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or(SessionError::LogoNotFound(id))?;
        // The batch URL is revoked with the batch; favorites are served from their data.
        logo.image.display_url = None;

        let entry = FavoriteEntry::new(logo, Utc::now());
        let evicted = match state.favorites.insert(entry.clone()) {
            Ok(evicted) => evicted.map(|e| e.id()),
            Err(full) => {
                warn!("Cannot favorite logo {}: {}", id, full);
                return Err(full.into());
            }
        };
        let count = state.favorites.len();
        drop(state);

        info!("Added logo {} to favorites ({} total)", id, count);
        if let Some(old) = evicted {
            info!("Evicted oldest favorite {}", old);
            self.unpersist(old).await;
        }
        if let Err(e) = self.store.persist_favorite(&entry).await {
            warn!("Failed to persist favorite {}: {}", id, e);
        }
        Ok(FavoriteToggle::Added { evicted })
    }

    /// Removes the logo from favorites. Removing an absent logo is not an error.
    pub async fn remove_favorite(&self, id: LogoId) {
        let _writes = self.favorites_writes.lock().await;
        let removed = self.state.lock().await.favorites.remove(id).is_some();
        if removed {
            info!("Removed logo {} from favorites", id);
            self.unpersist(id).await;
        }
    }

    /// Removes every favorite and returns how many there were.
    pub async fn clear_favorites(&self) -> usize {
        let _writes = self.favorites_writes.lock().await;
        let cleared = self.state.lock().await.favorites.clear();
        for entry in &cleared {
            self.unpersist(entry.id()).await;
        }
        info!("Cleared {} favorites", cleared.len());
        cleared.len()
    }

    async fn unpersist(&self, id: LogoId) {
        if let Err(e) = self.store.remove_favorite_persisted(id).await {
            warn!("Failed to remove persisted favorite {}: {}", id, e);
        }
    }

    pub async fn is_favorite(&self, id: LogoId) -> bool {
        self.state.lock().await.favorites.contains(id)
    }

    pub async fn favorite(&self, id: LogoId) -> Option<FavoriteEntry> {
        self.state.lock().await.favorites.get(id).cloned()
    }

    pub async fn list_favorites_newest_first(&self) -> Vec<FavoriteEntry> {
        self.state.lock().await.favorites.newest_first()
    }

    pub async fn set_active_view(&self, view: ActiveView) {
        self.state.lock().await.active_view = view;
    }

    /// Prepares a logo from the current batch or from favorites for download
    /// and hands it to the blob adapter.
    pub async fn download(&self, id: LogoId) -> Result<Download, SessionError> {
        let logo = {
            let state = self.state.lock().await;
            state
                .current_batch
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .or_else(|| state.favorites.get(id).map(|e| e.logo.clone()))
                .ok_or(SessionError::LogoNotFound(id))?
        };

        let data = if logo.image.data.is_empty() {
            self.blobs.fetch_as_binary(&logo.image.source_url).await?
        } else {
            logo.image.data
        };
        let filename = Download::filename_for(id);
        self.blobs.trigger_download(data.clone(), &filename).await?;
        info!("Prepared download {}", filename);

        Ok(Download { filename, data })
    }

    /// Tears the session down: releases the current batch and its temporary URLs.
    pub async fn shutdown(&self) {
        let handles = {
            let mut state = self.state.lock().await;
            state.current_batch.clear();
            std::mem::take(&mut state.batch_handles)
        };
        self.revoke_all(&handles);
        info!("Session shut down; released {} temporary images", handles.len());
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for handle in state.batch_handles.drain(..) {
            self.blobs.revoke_temporary_url(&handle);
        }
    }
}
