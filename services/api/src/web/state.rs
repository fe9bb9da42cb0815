//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::TempImageStore;
use logosnap_core::SessionController;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// The service hosts a single user session for its whole lifetime.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionController>,
    /// Backs the temporary `/images/{key}` URLs handed out for the current batch.
    pub temp_images: Arc<TempImageStore>,
}
