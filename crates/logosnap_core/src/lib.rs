pub mod domain;
pub mod favorites;
pub mod ports;
pub mod session;

pub use domain::{
    ActiveView, Batch, Download, FavoriteEntry, GeneratedImage, ImageRef, Logo, LogoId,
    SessionSnapshot, TempImageHandle, BATCH_SIZE,
};
pub use favorites::{CapacityPolicy, Favorites, MAX_FAVORITES};
pub use ports::{BlobStorageService, FavoriteStore, ImageGenerationService, PortError, PortResult};
pub use session::{FavoriteToggle, SessionConfig, SessionController, SessionError};
