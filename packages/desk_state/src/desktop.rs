//! Desktop operations
//!
//! The named operations over the shared state. Each mutation runs as a single
//! `StateStore::mutate` and is followed by exactly one broadcast pass once it
//! has committed. File persistence happens before the mutation and outside the
//! state lock.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::blob::{BlobStore, MemoryBlobStore, validate_blob_name};
use crate::broadcaster::Broadcaster;
use crate::error::{DeskError, Result};
use crate::metrics::SyncMetrics;
use crate::models::{File, LoadedFile, Snapshot, SystemState, ThemeUpdate, Window, DEFAULT_THEME};
use crate::registry::{ConnectionId, ConnectionRegistry, DEFAULT_CHANNEL_CAPACITY, Subscription};
use crate::store::StateStore;

pub struct DesktopBuilder {
    theme: String,
    channel_capacity: usize,
    blobs: Option<Arc<dyn BlobStore>>,
    metrics: Option<Arc<SyncMetrics>>,
}

impl DesktopBuilder {
    /// Theme the desktop starts with.
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    /// Snapshots buffered per subscriber before it is considered failed.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Desktop {
        let store = Arc::new(StateStore::new(SystemState::with_theme(self.theme)));
        let registry = Arc::new(ConnectionRegistry::new(self.channel_capacity));
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(SyncMetrics::new()));
        let broadcaster = Broadcaster::new(store.clone(), registry.clone(), metrics.clone());
        let blobs = self
            .blobs
            .unwrap_or_else(|| Arc::new(MemoryBlobStore::new()));

        Desktop {
            store,
            registry,
            broadcaster,
            blobs,
            metrics,
        }
    }
}

/// Handle to the shared desktop. Wrap in an `Arc` to share across tasks.
pub struct Desktop {
    store: Arc<StateStore>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    blobs: Arc<dyn BlobStore>,
    metrics: Arc<SyncMetrics>,
}

impl Desktop {
    pub fn builder() -> DesktopBuilder {
        DesktopBuilder {
            theme: DEFAULT_THEME.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            blobs: None,
            metrics: None,
        }
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Apply one mutation, then broadcast the committed state.
    async fn commit<F, R>(&self, op: &str, f: F) -> R
    where
        F: FnOnce(&mut SystemState) -> R,
    {
        let result = self.store.mutate(f).await;
        self.metrics.mutation_committed();
        let report = self.broadcaster.broadcast().await;
        debug!(
            "[{}] committed v{}, delivered to {} connection(s)",
            op, report.version, report.delivered
        );
        result
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn state(&self) -> Snapshot {
        self.store.read().await
    }

    pub async fn files(&self) -> Vec<File> {
        self.store.read().await.state.files.clone()
    }

    // =========================================================================
    // Windows
    // =========================================================================

    /// Append a window. Duplicate ids are accepted.
    pub async fn create_window(&self, window: Window) -> Window {
        let created = window.clone();
        self.commit("CreateWindow", move |s| s.windows.push(window))
            .await;
        created
    }

    /// Replace the first window with `id` wholesale. Absent ids are a silent no-op
    /// that still broadcasts.
    pub async fn update_window(&self, id: &str, window: Window) -> Window {
        let updated = window.clone();
        let found = self
            .commit("UpdateWindow", |s| {
                match s.windows.iter_mut().find(|w| w.id == id) {
                    Some(slot) => {
                        *slot = window;
                        true
                    }
                    None => false,
                }
            })
            .await;
        if !found {
            debug!("UpdateWindow: no window with id {}", id);
        }
        updated
    }

    /// Remove the first window with `id`, keeping the order of the rest.
    pub async fn delete_window(&self, id: &str) {
        let found = self
            .commit("DeleteWindow", |s| {
                match s.windows.iter().position(|w| w.id == id) {
                    Some(index) => {
                        s.windows.remove(index);
                        true
                    }
                    None => false,
                }
            })
            .await;
        if !found {
            debug!("DeleteWindow: no window with id {}", id);
        }
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Append a file. Duplicate names are accepted.
    pub async fn create_file(&self, file: File) -> File {
        let created = file.clone();
        self.commit("CreateFile", move |s| s.files.push(file)).await;
        created
    }

    /// Persist the content under the file's name, then replace the first
    /// in-memory file with that name.
    ///
    /// If the write fails nothing in memory changes and nothing is broadcast.
    /// A successful write with no matching in-memory file still succeeds.
    pub async fn save_file(&self, file: File) -> Result<File> {
        validate_blob_name(&file.name).map_err(|e| DeskError::validation(e.to_string()))?;

        let content = file.content.as_deref().unwrap_or_default();
        if let Err(source) = self.blobs.put(&file.name, content).await {
            self.metrics.persistence_error();
            warn!("Failed to persist file {}: {}", file.name, source);
            return Err(DeskError::Persistence {
                name: file.name,
                source,
            });
        }

        let saved = file.clone();
        let found = self
            .commit("SaveFile", |s| {
                match s.files.iter_mut().find(|f| f.name == file.name) {
                    Some(slot) => {
                        *slot = file;
                        true
                    }
                    None => false,
                }
            })
            .await;
        if !found {
            debug!("SaveFile: {} persisted but not in the file list", saved.name);
        }
        Ok(saved)
    }

    /// Read saved content straight from the blob store.
    pub async fn load_file(&self, name: &str) -> Result<LoadedFile> {
        validate_blob_name(name).map_err(|e| DeskError::validation(e.to_string()))?;

        let content = self
            .blobs
            .get(name)
            .await
            .map_err(|e| DeskError::from_read(name, e))?;
        Ok(LoadedFile {
            name: name.to_string(),
            content,
        })
    }

    // =========================================================================
    // Theme
    // =========================================================================

    /// Overwrite the theme. Returns the theme in effect after the change.
    pub async fn set_theme(&self, theme: String) -> ThemeUpdate {
        let theme = self
            .commit("SetTheme", move |s| {
                s.theme = theme;
                s.theme.clone()
            })
            .await;
        ThemeUpdate { theme }
    }

    // =========================================================================
    // Subscribers
    // =========================================================================

    /// Register a subscriber and read its initial snapshot.
    ///
    /// Registration happens first, so any mutation committed after the read is
    /// guaranteed to reach the new subscriber through a broadcast.
    pub async fn subscribe(&self) -> (Subscription, Snapshot) {
        let subscription = self.registry.register().await;
        self.metrics.connection_opened();
        let initial = self.store.read().await;
        debug!(
            "Subscriber {} registered at v{}",
            subscription.id(),
            initial.version
        );
        (subscription, initial)
    }

    /// Unregister a subscriber. Safe to call after it was already pruned.
    pub async fn disconnect(&self, id: ConnectionId) {
        if self.registry.unregister(id).await {
            self.metrics.connection_closed();
        }
    }

    /// Close every subscriber stream. Returns how many were open.
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.close_all().await;
        for _ in 0..closed {
            self.metrics.connection_closed();
        }
        if closed > 0 {
            info!("Closed {} subscriber connection(s)", closed);
        }
        closed
    }
}
