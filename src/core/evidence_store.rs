// Evidence store - object storage for snapshot images
// Backends: local filesystem, HTTP object endpoint, in-memory

use crate::models::policy::ViolationKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object store returned {status} for {key}")]
    Status { status: u16, key: String },

    #[error("Storage error: {0}")]
    Other(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Key-addressed blob storage for evidence images
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    fn backend_name(&self) -> &'static str;
}

// ==============================================================================
// Object Keys
// ==============================================================================

/// Object key for a snapshot:
/// `user_{user}/{YYYY-MM-DD}/{YYYY-MM-DD_HH-MM-SS-mmm}_{snapshot_id}_{violation|normal}.jpg`
///
/// The snapshot id keeps keys distinct when two uploads share a millisecond.
pub fn snapshot_key(
    user_id: &str,
    snapshot_id: &str,
    taken_at: DateTime<Utc>,
    violation: Option<ViolationKind>,
) -> String {
    let date = taken_at.format("%Y-%m-%d");
    let stamp = taken_at.format("%Y-%m-%d_%H-%M-%S-%3f");
    let suffix = violation.map(|v| v.to_string()).unwrap_or("normal");
    format!("user_{}/{}/{}_{}_{}.jpg", user_id, date, stamp, snapshot_id, suffix)
}

/// Keys are relative, slash-separated, and never escape their root
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let all_normal = Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !all_normal {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ==============================================================================
// Filesystem Backend
// ==============================================================================

/// Stores each object as a file under `base_path`
pub struct FsEvidenceStore {
    base_path: PathBuf,
}

impl FsEvidenceStore {
    pub async fn new(base_path: PathBuf) -> StorageResult<Self> {
        tokio::fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl EvidenceStore for FsEvidenceStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key, path = %path.display(), "stored evidence object");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.base_path) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

// ==============================================================================
// HTTP Backend
// ==============================================================================

/// Path-style HTTP object endpoint: objects live at `{endpoint}/{bucket}/{key}`.
///
/// Listing expects `GET {endpoint}/{bucket}?prefix=...` to answer with a JSON
/// array of keys. Request signing is left to a fronting gateway; an optional
/// bearer token is sent when configured.
pub struct HttpEvidenceStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl HttpEvidenceStore {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            token,
        })
    }

    fn object_url(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("{}/{}/{}", self.endpoint, self.bucket, key))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check_status(response: &reqwest::Response, key: &str) -> StorageResult<()> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::Status {
                status: status.as_u16(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EvidenceStore for HttpEvidenceStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let url = self.object_url(key)?;
        let response = self
            .authorize(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        Self::check_status(&response, key)?;
        tracing::debug!(key, "uploaded evidence object");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let url = self.object_url(key)?;
        let response = self.authorize(self.client.get(&url)).send().await?;
        Self::check_status(&response, key)?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let url = self.object_url(key)?;
        let response = self.authorize(self.client.delete(&url)).send().await?;
        Self::check_status(&response, key)?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let url = format!("{}/{}", self.endpoint, self.bucket);
        let response = self
            .authorize(self.client.get(&url).query(&[("prefix", prefix)]))
            .send()
            .await?;
        Self::check_status(&response, prefix)?;
        let mut keys: Vec<String> = response.json().await?;
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

// ==============================================================================
// In-Memory Backend
// ==============================================================================

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Process-local store, used for embedding and tests
#[derive(Default)]
pub struct MemoryEvidenceStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
