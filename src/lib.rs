// ABOUTME: Library module for the stepdeck presentation backend.
// ABOUTME: Contains deck storage, thumbnail scheduling and rendering, and standalone HTML export.

pub mod config;
pub mod errors;
pub mod export;
pub mod html;
pub mod imaging;
pub mod models;
pub mod repository;
pub mod resources;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod thumbnail;
pub mod utils;

// Reexport common types and functions
pub use config::Config;
pub use errors::{DeckError, Result};
pub use export::{ExportConfig, ExportRenderer, ExportedDeck};
pub use imaging::{create_thumbnail, optimize_image, ThumbnailFormat};
pub use models::{Deck, Preview, Step, UploadedFile};
pub use repository::{DeckFilter, DeckRepository, JsonRepository, MemoryRepository};
pub use resources::{AssetFetcher, FetchOutcome, HttpFetcher};
pub use scheduler::{Regenerate, RegenerationScheduler};
pub use service::{DeckService, DeckThumbnail, NewStep, StepData, StepSettings};
pub use storage::{AssetStore, LocalAssetStore, MemoryAssetStore, UrlSigner};
pub use thumbnail::{placeholder_svg, system_fonts, ThumbnailConfig, ThumbnailGenerator};
