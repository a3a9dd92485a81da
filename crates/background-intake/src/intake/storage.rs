use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use super::gateway::SubmissionRecord;

/// Per-upload options understood by object storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub cache_control: String,
    pub upsert: bool,
    pub content_type: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            cache_control: "3600".to_string(),
            upsert: false,
            content_type: None,
        }
    }
}

/// Location of an object after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("The resource already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid object path '{0}'")]
    InvalidPath(String),
    #[error("object storage rejected the upload: {0}")]
    Rejected(String),
    #[error("object storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob storage for applicant attachments.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        content: Bytes,
        options: &UploadOptions,
    ) -> Result<StoredObject, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid table name '{0}'")]
    InvalidTable(String),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Relational sink for completed submissions. Single-row inserts only.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert(&self, table: &str, record: &SubmissionRecord) -> Result<(), StoreError>;
}

/// Filesystem-backed object storage rooted at `<root>/<bucket>`.
///
/// Each object gets a `<path>.meta.json` sidecar recording its content type
/// and cache-control header.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    bucket_root: PathBuf,
}

#[derive(Debug, Serialize)]
struct ObjectSidecar<'a> {
    content_type: Option<&'a str>,
    cache_control: &'a str,
    size: usize,
}

impl LocalObjectStorage {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            bucket_root: root.as_ref().join(bucket),
        }
    }

    pub fn bucket_root(&self) -> &Path {
        &self.bucket_root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.bucket_root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        path: &str,
        content: Bytes,
        options: &UploadOptions,
    ) -> Result<StoredObject, StorageError> {
        let target = self.resolve(path)?;

        if !options.upsert && tokio::fs::try_exists(&target).await? {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&target, &content).await?;

        let sidecar = ObjectSidecar {
            content_type: options.content_type.as_deref(),
            cache_control: &options.cache_control,
            size: content.len(),
        };
        let encoded = serde_json::to_vec_pretty(&sidecar)
            .map_err(|err| StorageError::Rejected(err.to_string()))?;
        let mut sidecar_path = target.clone().into_os_string();
        sidecar_path.push(".meta.json");
        tokio::fs::write(PathBuf::from(sidecar_path), encoded).await?;

        debug!(path, bytes = content.len(), "object stored");
        Ok(StoredObject {
            path: path.to_string(),
        })
    }
}
