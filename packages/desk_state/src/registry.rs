//! Connection Registry
//!
//! Tracks live subscribers. Each connection owns a bounded outbound queue plus
//! a one-slot overflow holding the newest snapshot that did not fit. The
//! registry keeps the sending half, the subscriber keeps the receiver.
//! Dropping the sending half (unregister) ends the subscriber's stream.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::Snapshot;

/// Default number of snapshots queued per connection before it is marked lagged.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type PendingSlot = Arc<Mutex<Option<Snapshot>>>;

fn lock_slot(slot: &PendingSlot) -> std::sync::MutexGuard<'_, Option<Snapshot>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of handing one snapshot to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued in order behind earlier snapshots
    Queued,
    /// Queue full; parked as the newest pending snapshot
    Lagged,
    /// The subscriber is gone
    Closed,
}

/// Sending side of a registered connection.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Snapshot>,
    pending: PendingSlot,
}

impl Outbox {
    /// Deliver without waiting. A full queue never ends the connection: the
    /// snapshot is parked and handed out once the subscriber drains its queue.
    pub fn deliver(&self, snapshot: Snapshot) -> Delivery {
        match self.tx.try_send(snapshot) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(snapshot)) => {
                let mut slot = lock_slot(&self.pending);
                if slot.as_ref().is_none_or(|p| p.version < snapshot.version) {
                    *slot = Some(snapshot);
                }
                Delivery::Lagged
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Receiving side of a registered connection.
pub struct Subscription {
    id: ConnectionId,
    receiver: mpsc::Receiver<Snapshot>,
    pending: PendingSlot,
    last_version: Option<u64>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next broadcast snapshot, or `None` once the connection is unregistered.
    ///
    /// Queued snapshots come first, in order. A snapshot parked while the
    /// queue was full follows them unless something newer was already returned.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        match self.receiver.try_recv() {
            Ok(snapshot) => Some(self.accept(snapshot)),
            Err(TryRecvError::Empty) => {
                if let Some(snapshot) = self.take_pending() {
                    return Some(self.accept(snapshot));
                }
                let snapshot = self.receiver.recv().await?;
                Some(self.accept(snapshot))
            }
            Err(TryRecvError::Disconnected) => {
                let snapshot = self.take_pending()?;
                Some(self.accept(snapshot))
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        let snapshot = match self.receiver.try_recv() {
            Ok(snapshot) => snapshot,
            Err(_) => self.take_pending()?,
        };
        Some(self.accept(snapshot))
    }

    fn accept(&mut self, snapshot: Snapshot) -> Snapshot {
        self.last_version = Some(
            self.last_version
                .map_or(snapshot.version, |v| v.max(snapshot.version)),
        );
        snapshot
    }

    fn take_pending(&mut self) -> Option<Snapshot> {
        let parked = lock_slot(&self.pending).take()?;
        match self.last_version {
            Some(v) if parked.version <= v => None,
            _ => Some(parked),
        }
    }
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Outbox>>,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Add a connection. The caller is responsible for delivering the initial snapshot.
    pub async fn register(&self) -> Subscription {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.capacity);
        let pending = PendingSlot::default();
        self.connections.write().await.insert(
            id,
            Outbox {
                tx,
                pending: pending.clone(),
            },
        );
        debug!("[REGISTRY] Registered connection {}", id);
        Subscription {
            id,
            receiver: rx,
            pending,
            last_version: None,
        }
    }

    /// Remove a connection, closing its stream. Returns false if it was already gone.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id).is_some();
        if removed {
            debug!("[REGISTRY] Unregistered connection {}", id);
        }
        removed
    }

    /// Apply `f` to every connection registered at the time of the call.
    ///
    /// Membership is copied under the lock and the lock is released before `f`
    /// runs, so `f` may trigger register/unregister without deadlocking.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(ConnectionId, &Outbox),
    {
        let members: Vec<(ConnectionId, Outbox)> = self
            .connections
            .read()
            .await
            .iter()
            .map(|(id, outbox)| (*id, outbox.clone()))
            .collect();

        for (id, outbox) in &members {
            f(*id, outbox);
        }
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Drop every connection. Returns how many were open.
    pub async fn close_all(&self) -> usize {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
