// ABOUTME: Error types for the stepdeck crate
// ABOUTME: Provides structured error handling for storage, rendering and export

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to fetch remote resource: {0}")]
    FetchError(#[from] reqwest::Error),

    #[error("Failed to (de)serialize document: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Input validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),

    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl From<anyhow::Error> for DeckError {
    fn from(err: anyhow::Error) -> Self {
        DeckError::UnknownError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeckError>;
