pub mod blob;
pub mod db;
pub mod memory_store;
pub mod openai_image;
pub mod placeholder_image;

pub use blob::{HttpBlobAdapter, TempImageStore};
pub use db::DbAdapter;
pub use memory_store::InMemoryFavoriteStore;
pub use openai_image::OpenAiImageAdapter;
pub use placeholder_image::PlaceholderImageAdapter;
