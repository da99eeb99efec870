#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use resvg::usvg::fontdb;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stepdeck::resources::AssetFetcher;
use stepdeck::storage::UrlSigner;
use stepdeck::{
    AssetStore, DeckError, DeckService, ExportConfig, ExportRenderer, FetchOutcome,
    MemoryAssetStore, MemoryRepository, RegenerationScheduler, Result, ThumbnailConfig,
    ThumbnailGenerator,
};
use tokio::sync::Notify;

pub const RUNTIME_URL: &str = "https://cdn.test/impress.js";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fetcher answering from a fixed table; unknown URLs are unavailable.
#[derive(Default)]
pub struct StubFetcher {
    responses: Mutex<HashMap<String, FetchOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, bytes: Vec<u8>, content_type: &str) {
        self.responses.lock().insert(
            url.to_string(),
            FetchOutcome::Fetched {
                bytes,
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AssetFetcher for StubFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> FetchOutcome {
        self.calls.lock().push(url.to_string());
        self.responses
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchOutcome::Unavailable("connection refused".to_string()))
    }
}

/// Store whose uploads wait until the test releases them.
pub struct GatedStore {
    inner: Arc<MemoryAssetStore>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryAssetStore>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl AssetStore for GatedStore {
    async fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.put(bytes, key, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> bool {
        self.inner.delete(key).await
    }

    fn signer(&self) -> &UrlSigner {
        self.inner.signer()
    }
}

/// Store whose uploads always fail.
pub struct FailingStore {
    inner: Arc<MemoryAssetStore>,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryAssetStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AssetStore for FailingStore {
    async fn put(&self, _bytes: Vec<u8>, key: &str, _content_type: &str) -> Result<String> {
        Err(DeckError::StorageError(format!("Bucket unavailable for {}", key)))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> bool {
        self.inner.delete(key).await
    }

    fn signer(&self) -> &UrlSigner {
        self.inner.signer()
    }
}

pub fn export_config(runtime: Option<&str>) -> ExportConfig {
    ExportConfig {
        runtime_script_url: runtime.map(|url| url.to_string()),
        ..ExportConfig::default()
    }
}

/// Service over in-memory stores with no system fonts loaded.
pub struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub store: Arc<MemoryAssetStore>,
    pub fetcher: Arc<StubFetcher>,
    pub service: DeckService,
}

impl Harness {
    pub fn new(debounce: Duration) -> Self {
        let store = Arc::new(MemoryAssetStore::default());
        Self::with_store(debounce, store.clone(), store)
    }

    /// Service writing through `backend`, which wraps or is `store`.
    pub fn with_store(
        debounce: Duration,
        store: Arc<MemoryAssetStore>,
        backend: Arc<dyn AssetStore>,
    ) -> Self {
        init_logging();
        let repo = Arc::new(MemoryRepository::new());
        let fetcher = Arc::new(StubFetcher::new());

        let thumbnails = Arc::new(ThumbnailGenerator::with_fonts(
            repo.clone(),
            backend.clone(),
            ThumbnailConfig::default(),
            Arc::new(fontdb::Database::new()),
        ));
        let scheduler = Arc::new(RegenerationScheduler::new(thumbnails.clone()));
        let exporter = ExportRenderer::new(repo.clone(), fetcher.clone(), export_config(None));
        let service = DeckService::new(
            repo.clone(),
            backend,
            thumbnails,
            scheduler,
            exporter,
            debounce,
        );

        Self {
            repo,
            store,
            fetcher,
            service,
        }
    }

    /// Wait in real time until no regeneration is pending for `deck_id`.
    pub async fn settle(&self, deck_id: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while self.service.scheduler().is_pending(deck_id) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "Regeneration for {} did not finish",
                deck_id
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
