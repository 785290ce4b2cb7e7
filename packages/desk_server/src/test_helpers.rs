use std::sync::Arc;

use desk_state::{Desktop, FsBlobStore, MemoryBlobStore};

use crate::AppState;

/// Build an `AppState` whose saved files live in memory.
///
/// The returned `MemoryBlobStore` is the same instance the desktop writes to,
/// so tests can inspect saved blobs or force write failures.
pub fn test_app_state() -> (AppState, Arc<MemoryBlobStore>) {
    let blobs = Arc::new(MemoryBlobStore::new());
    let desktop = Desktop::builder().blob_store(blobs.clone()).build();
    (AppState::new(Arc::new(desktop)), blobs)
}

/// Like `test_app_state`, but backed by a real directory.
///
/// Callers **must** hold the `TempDir` for the lifetime of the test.
pub fn test_app_state_with_fs() -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let blobs = FsBlobStore::new(tmp.path().join("files")).expect("blob dir");
    let desktop = Desktop::builder().blob_store(Arc::new(blobs)).build();
    (AppState::new(Arc::new(desktop)), tmp)
}

/// Read a JSON response body.
pub async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&body).expect("json body")
}
