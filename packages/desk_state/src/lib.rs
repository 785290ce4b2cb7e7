//! Desk State - authoritative desktop state with live fan-out
//!
//! This crate owns the shared record of open windows, virtual files and the UI
//! theme for a simulated desktop, and pushes a full snapshot of that record to
//! every connected viewer whenever it changes. It has no HTTP dependencies; the
//! routing layer lives in `desk_server`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use desk_state::{Desktop, MemoryBlobStore, Window};
//!
//! #[tokio::main]
//! async fn main() {
//!     let desktop = Desktop::builder()
//!         .blob_store(Arc::new(MemoryBlobStore::new()))
//!         .build();
//!
//!     // Subscribe: first item is the current state, then one per mutation.
//!     let (mut subscription, initial) = desktop.subscribe().await;
//!     println!("theme on connect: {}", initial.state.theme);
//!
//!     desktop
//!         .create_window(Window {
//!             id: "w1".to_string(),
//!             title: "Calculator".to_string(),
//!             kind: "app".to_string(),
//!             ..Default::default()
//!         })
//!         .await;
//!
//!     if let Some(snapshot) = subscription.recv().await {
//!         println!("{} window(s) open", snapshot.state.windows.len());
//!     }
//! }
//! ```

pub mod blob;
pub mod broadcaster;
pub mod desktop;
pub mod error;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod store;

pub use blob::{BlobError, BlobStore, FsBlobStore, MemoryBlobStore, validate_blob_name};
pub use broadcaster::{BroadcastReport, Broadcaster};
pub use desktop::{Desktop, DesktopBuilder};
pub use error::{DeskError, Result};
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use models::{File, LoadedFile, Snapshot, SystemState, ThemeUpdate, Window, DEFAULT_THEME};
pub use registry::{
    ConnectionId, ConnectionRegistry, DEFAULT_CHANNEL_CAPACITY, Delivery, Outbox, Subscription,
};
pub use store::StateStore;
