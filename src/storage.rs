// ABOUTME: Asset store contract for binary objects (thumbnails, uploaded media)
// ABOUTME: Provides a filesystem-backed store and an in-memory store with presigned URLs

use crate::errors::{DeckError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use log::{debug, warn};
use parking_lot::RwLock;
use sha2::Sha256;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Secret used when none is configured. Only suitable for local development.
pub const DEV_SIGNING_SECRET: &str = "stepdeck-dev-signing-secret";

/// Content-addressed blob storage. Keys look like `<entity-kind>/<entity-id>/<discriminator>`.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object. Returns the key.
    async fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove an object. Missing objects and failures report `false`.
    async fn delete(&self, key: &str) -> bool;

    /// Signer for this store's read URLs.
    fn signer(&self) -> &UrlSigner;

    /// Time-limited read URL for `key`.
    async fn presign(&self, key: &str, ttl_days: u32) -> Result<String> {
        self.signer().sign(key, ttl_days)
    }

    /// Read the object a presigned URL points at, after checking its signature and expiry.
    async fn get_presigned(&self, url: &str) -> Result<Vec<u8>> {
        let key = self.signer().verify(url)?;
        self.get(&key).await
    }
}

fn validate_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    let well_formed = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if well_formed {
        Ok(())
    } else {
        Err(DeckError::ValidationError(format!(
            "Invalid object key: {:?}",
            key
        )))
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    // join() drops the last path segment unless it ends with a slash
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };
    Ok(Url::parse(&normalized)?)
}

fn invalid_url(reason: &str) -> DeckError {
    DeckError::ValidationError(format!("Invalid presigned URL: {}", reason))
}

/// HMAC-SHA256 URL signer.
///
/// URLs look like `<base>/<key>?expires=<unix>&signature=<hex>`, where the
/// signature covers `<key path>:<expires>`.
#[derive(Clone)]
pub struct UrlSigner {
    base_url: Url,
    secret: String,
}

impl UrlSigner {
    pub fn new(base_url: &str, secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(DeckError::ConfigError(
                "Signing secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            secret: secret.to_string(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sign `key` for `ttl_days` days from now.
    pub fn sign(&self, key: &str, ttl_days: u32) -> Result<String> {
        let expires = Utc::now()
            .checked_add_signed(ChronoDuration::days(i64::from(ttl_days)))
            .ok_or_else(|| {
                DeckError::ValidationError(format!(
                    "Presign lifetime of {} days is out of range",
                    ttl_days
                ))
            })?;
        self.sign_until(key, expires)
    }

    /// Sign `key` with an explicit expiry.
    pub fn sign_until(&self, key: &str, expires: DateTime<Utc>) -> Result<String> {
        validate_key(key)?;
        let expires = expires.timestamp();
        let mut url = self.base_url.join(key)?;
        let signature = self.signature(self.key_path(&url)?, expires)?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    /// Check a presigned URL and return the object key it grants.
    pub fn verify(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| invalid_url(&e.to_string()))?;
        let param = |name: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .ok_or_else(|| invalid_url(&format!("missing {} parameter", name)))
        };

        let expires: i64 = param("expires")?
            .parse()
            .map_err(|_| invalid_url("malformed expires parameter"))?;
        let signature =
            hex::decode(param("signature")?).map_err(|_| invalid_url("malformed signature"))?;

        if Utc::now().timestamp() > expires {
            return Err(invalid_url("expired"));
        }

        let path = self.key_path(&parsed)?;
        let mut mac = self.mac()?;
        mac.update(format!("{}:{}", path, expires).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| invalid_url("signature mismatch"))?;

        let key = path.to_string();
        validate_key(&key)?;
        Ok(key)
    }

    /// Object path of `url` relative to the base URL, still percent-encoded.
    fn key_path<'a>(&self, url: &'a Url) -> Result<&'a str> {
        if url.origin() != self.base_url.origin() {
            return Err(invalid_url("foreign host"));
        }
        url.path()
            .strip_prefix(self.base_url.path())
            .filter(|path| !path.is_empty())
            .ok_or_else(|| invalid_url("outside the store"))
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| DeckError::ConfigError(format!("Invalid signing secret: {}", e)))
    }

    fn signature(&self, path: &str, expires: i64) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(format!("{}:{}", path, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Objects stored as plain files below a root directory.
pub struct LocalAssetStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str, secret: &str) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            signer: UrlSigner::new(base_url, secret)?,
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        debug!(
            "Stored {} ({} bytes, {}) at {:?}",
            key,
            bytes.len(),
            content_type,
            path
        );
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DeckError::AssetNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let path = match self.object_path(key) {
            Ok(path) => path,
            Err(_) => return false,
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to delete object {}: {}", key, e);
                false
            }
        }
    }

    fn signer(&self) -> &UrlSigner {
        &self.signer
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Objects held in a map; for tests and single-process tooling.
pub struct MemoryAssetStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    signer: UrlSigner,
}

impl MemoryAssetStore {
    pub fn new(base_url: &str, secret: &str) -> Result<Self> {
        Ok(Self {
            objects: RwLock::new(HashMap::new()),
            signer: UrlSigner::new(base_url, secret)?,
        })
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            signer: UrlSigner::new("http://localhost:9000/stepdeck/", DEV_SIGNING_SECRET)
                .expect("static signer settings are valid"),
        }
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String> {
        validate_key(key)?;
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| DeckError::AssetNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }

    fn signer(&self) -> &UrlSigner {
        &self.signer
    }
}
