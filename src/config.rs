// ABOUTME: Configuration module for the stepdeck crate
// ABOUTME: Provides configuration settings and environment variable handling

use crate::errors::{DeckError, Result};
use crate::export::ExportConfig;
use crate::storage::DEV_SIGNING_SECRET;
use crate::thumbnail::ThumbnailConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RUNTIME_SCRIPT_URL: &str =
    "https://cdn.jsdelivr.net/npm/impress.js@2.0.0/js/impress.min.js";

/// Longest lifetime accepted for presigned URLs
pub const MAX_PRESIGN_TTL_DAYS: u32 = 3650;

/// Global configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub asset_dir: PathBuf,
    pub asset_base_url: String,
    pub signing_secret: String,
    pub debounce_ms: u64,
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
    pub presign_ttl_days: u32,
    pub inline_threshold_bytes: usize,
    pub asset_fetch_timeout_ms: u64,
    pub runtime_fetch_timeout_ms: u64,
    pub runtime_script_url: String,
    pub storage_markers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            asset_dir: PathBuf::from("data/assets"),
            asset_base_url: "http://localhost:9000/stepdeck/".to_string(),
            signing_secret: DEV_SIGNING_SECRET.to_string(),
            debounce_ms: 2000,
            thumbnail_size: 200,
            thumbnail_quality: 85,
            presign_ttl_days: 7,
            inline_threshold_bytes: 100 * 1024,
            asset_fetch_timeout_ms: 5000,
            runtime_fetch_timeout_ms: 10000,
            runtime_script_url: DEFAULT_RUNTIME_SCRIPT_URL.to_string(),
            storage_markers: vec!["minio".to_string(), "decks/".to_string()],
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl Config {
    /// Create a new configuration instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration rooted at a data directory, assets stored beneath it
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            asset_dir: data_dir.join("assets"),
            data_dir,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = env::var("STEPDECK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let asset_dir = env::var("STEPDECK_ASSET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("assets"));
        let asset_base_url =
            env::var("STEPDECK_ASSET_BASE_URL").unwrap_or(defaults.asset_base_url);
        let signing_secret =
            env::var("STEPDECK_SIGNING_SECRET").unwrap_or(defaults.signing_secret);
        let runtime_script_url =
            env::var("STEPDECK_RUNTIME_SCRIPT_URL").unwrap_or(defaults.runtime_script_url);
        let storage_markers = env::var("STEPDECK_STORAGE_MARKERS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.storage_markers);

        Self {
            data_dir,
            asset_dir,
            asset_base_url,
            signing_secret,
            debounce_ms: env_parsed("STEPDECK_DEBOUNCE_MS").unwrap_or(defaults.debounce_ms),
            thumbnail_size: env_parsed("STEPDECK_THUMBNAIL_SIZE")
                .unwrap_or(defaults.thumbnail_size),
            thumbnail_quality: env_parsed("STEPDECK_THUMBNAIL_QUALITY")
                .unwrap_or(defaults.thumbnail_quality),
            presign_ttl_days: env_parsed("STEPDECK_PRESIGN_TTL_DAYS")
                .unwrap_or(defaults.presign_ttl_days),
            inline_threshold_bytes: env_parsed("STEPDECK_INLINE_THRESHOLD_BYTES")
                .unwrap_or(defaults.inline_threshold_bytes),
            asset_fetch_timeout_ms: env_parsed("STEPDECK_ASSET_FETCH_TIMEOUT_MS")
                .unwrap_or(defaults.asset_fetch_timeout_ms),
            runtime_fetch_timeout_ms: env_parsed("STEPDECK_RUNTIME_FETCH_TIMEOUT_MS")
                .unwrap_or(defaults.runtime_fetch_timeout_ms),
            runtime_script_url,
            storage_markers,
        }
    }

    /// Reject settings the renderers cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.thumbnail_size == 0 {
            return Err(DeckError::ConfigError(
                "Thumbnail size must be at least 1 pixel".to_string(),
            ));
        }
        if !(1..=100).contains(&self.thumbnail_quality) {
            return Err(DeckError::ConfigError(format!(
                "Thumbnail quality must be between 1 and 100, got {}",
                self.thumbnail_quality
            )));
        }
        if !(1..=MAX_PRESIGN_TTL_DAYS).contains(&self.presign_ttl_days) {
            return Err(DeckError::ConfigError(format!(
                "Presign lifetime must be between 1 and {} days, got {}",
                MAX_PRESIGN_TTL_DAYS, self.presign_ttl_days
            )));
        }
        if self.signing_secret.is_empty() {
            return Err(DeckError::ConfigError(
                "Signing secret must not be empty".to_string(),
            ));
        }
        url::Url::parse(&self.asset_base_url).map_err(|e| {
            DeckError::ConfigError(format!(
                "Invalid asset base URL {:?}: {}",
                self.asset_base_url, e
            ))
        })?;
        Ok(())
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Get an export configuration with defaults from this config
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            inline_threshold_bytes: self.inline_threshold_bytes,
            asset_fetch_timeout: Duration::from_millis(self.asset_fetch_timeout_ms),
            runtime_fetch_timeout: Duration::from_millis(self.runtime_fetch_timeout_ms),
            runtime_script_url: Some(self.runtime_script_url.clone())
                .filter(|url| !url.trim().is_empty()),
            storage_markers: self.storage_markers.clone(),
        }
    }

    /// Get a thumbnail configuration with defaults from this config
    pub fn thumbnail_config(&self) -> ThumbnailConfig {
        ThumbnailConfig {
            size: self.thumbnail_size,
            quality: self.thumbnail_quality,
            presign_ttl_days: self.presign_ttl_days,
            ..ThumbnailConfig::default()
        }
    }
}
