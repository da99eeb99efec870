// ABOUTME: Remote resource handling for exports
// ABOUTME: Single bounded fetch attempts that report a fallback instead of failing

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Result of a best-effort fetch. `Unavailable` is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched { bytes: Vec<u8>, content_type: String },
    Unavailable(String),
}

impl FetchOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched { .. })
    }

    /// Body as text, lossily decoded. `None` when unavailable.
    pub fn text(&self) -> Option<String> {
        match self {
            FetchOutcome::Fetched { bytes, .. } => Some(String::from_utf8_lossy(bytes).into_owned()),
            FetchOutcome::Unavailable(_) => None,
        }
    }
}

/// Fetches a URL exactly once within `timeout`.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchOutcome;
}

/// `reqwest`-backed fetcher. No retries.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchOutcome {
        debug!("Fetching remote resource: {}", url);

        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                info!("Fetch of {} failed: {}", url, e);
                return FetchOutcome::Unavailable(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            info!("Fetch of {} returned HTTP {}", url, status);
            return FetchOutcome::Unavailable(format!("HTTP error: {}", status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        match response.bytes().await {
            Ok(bytes) => FetchOutcome::Fetched {
                bytes: bytes.to_vec(),
                content_type,
            },
            Err(e) => {
                info!("Reading body of {} failed: {}", url, e);
                FetchOutcome::Unavailable(e.to_string())
            }
        }
    }
}

/// A stylesheet, script or font referenced by URL in an exported document.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResource {
    pub url: String,
}

impl RemoteResource {
    /// Returns `None` unless `url` is absolute http(s).
    pub fn new(url: &str) -> Option<Self> {
        let url = url.trim();
        let is_remote = url.starts_with("http://") || url.starts_with("https://");
        is_remote.then(|| Self {
            url: url.to_string(),
        })
    }

    /// `<link>` declaration loading this resource as a stylesheet.
    pub fn stylesheet_link(&self) -> String {
        format!(
            r#"<link href="{}" rel="stylesheet">"#,
            crate::html::escape(&self.url)
        )
    }
}

/// Deduplicated remote references in first-seen order.
pub fn remote_resources<'a>(urls: impl IntoIterator<Item = &'a str>) -> Vec<RemoteResource> {
    let mut out: Vec<RemoteResource> = Vec::new();
    for resource in urls.into_iter().filter_map(RemoteResource::new) {
        if !out.contains(&resource) {
            out.push(resource);
        }
    }
    out
}
