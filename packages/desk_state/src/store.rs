//! State Store
//!
//! Sole owner of the desktop state. Readers share access, mutations are
//! exclusive, and a reader never sees a half-applied mutation.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{Snapshot, SystemState};

struct Versioned {
    version: u64,
    state: Arc<SystemState>,
}

pub struct StateStore {
    inner: RwLock<Versioned>,
}

impl StateStore {
    pub fn new(initial: SystemState) -> Self {
        Self {
            inner: RwLock::new(Versioned {
                version: 0,
                state: Arc::new(initial),
            }),
        }
    }

    /// Take a snapshot of the current state.
    ///
    /// Cheap: the snapshot shares the state until the next mutation copies it.
    pub async fn read(&self) -> Snapshot {
        let guard = self.inner.read().await;
        Snapshot {
            version: guard.version,
            state: guard.state.clone(),
        }
    }

    /// Apply `f` to the state under exclusive access and bump the version.
    ///
    /// Snapshots handed out earlier are never altered. `f` must not block or
    /// perform I/O.
    pub async fn mutate<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SystemState) -> R,
    {
        let mut guard = self.inner.write().await;
        let result = f(Arc::make_mut(&mut guard.state));
        guard.version += 1;
        result
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(SystemState::default())
    }
}
