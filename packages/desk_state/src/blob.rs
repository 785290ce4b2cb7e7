//! Blob store for saved file content
//!
//! File content saved through the desktop is persisted one blob per file name,
//! verbatim, with no framing or metadata. The store is reached only by name and
//! guarantees nothing beyond last-write-wins per name.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("no blob named {name}")]
    NotFound { name: String },

    #[error("invalid blob name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("I/O error on blob {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Check that `name` addresses exactly one entry in a flat namespace.
pub fn validate_blob_name(name: &str) -> Result<(), BlobError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains(['/', '\\']) {
        Some("name contains a path separator")
    } else if name.contains('\0') {
        Some("name contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(BlobError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Key-value persistence for file content.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` under `name`, replacing any previous blob.
    ///
    /// A failed write must leave the previous blob, if any, intact.
    async fn put(&self, name: &str, content: &str) -> Result<(), BlobError>;

    /// Read the blob stored under `name`.
    async fn get(&self, name: &str) -> Result<String, BlobError>;
}

/// One file per blob inside a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    /// Where in-progress writes land before the rename; same filesystem as `root`
    staging: PathBuf,
}

impl FsBlobStore {
    /// Create the store, making `root` if it does not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            staging: root.clone(),
            root,
        })
    }

    #[cfg(test)]
    fn with_staging_dir(mut self, staging: impl Into<PathBuf>) -> Self {
        self.staging = staging.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, BlobError> {
        validate_blob_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, name: &str, content: &str) -> Result<(), BlobError> {
        let path = self.path_for(name)?;
        // Write beside the target and rename so a failed write never truncates the old blob.
        // Fixed-length temp name: any name the target directory accepts also fits here.
        let tmp = self
            .staging
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));

        let io_err = |source| BlobError::Io {
            name: name.to_string(),
            source,
        };

        if let Err(e) = tokio::fs::write(&tmp, content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }

        debug!("Saved blob {} ({} bytes)", name, content.len());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<String, BlobError> {
        let path = self.path_for(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(BlobError::Io {
                name: name.to_string(),
                source: e,
            }),
        }
    }
}

/// In-process blob store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with an I/O error (for exercising error paths).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, name: &str, content: &str) -> Result<(), BlobError> {
        validate_blob_name(name)?;
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(BlobError::Io {
                name: name.to_string(),
                source: std::io::Error::other("simulated write failure"),
            });
        }
        self.blobs
            .write()
            .await
            .insert(name.to_string(), content.to_string());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<String, BlobError> {
        validate_blob_name(name)?;
        self.blobs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                name: name.to_string(),
            })
    }
}
