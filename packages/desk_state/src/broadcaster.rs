//! Broadcaster
//!
//! One broadcast pass = one snapshot read, delivered to every registered
//! connection. Delivery never waits. A connection whose queue is full is marked
//! lagged and keeps the newest snapshot for later; only a closed channel counts
//! as a failed delivery, and that connection is unregistered on the spot.

use std::sync::Arc;
use tracing::debug;

use crate::metrics::SyncMetrics;
use crate::registry::{ConnectionId, ConnectionRegistry, Delivery};
use crate::store::StateStore;

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Version of the snapshot that was sent
    pub version: u64,
    pub delivered: usize,
    /// Connections whose queue was full; the snapshot waits in their overflow slot
    pub lagged: usize,
    pub pruned: usize,
}

pub struct Broadcaster {
    store: Arc<StateStore>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<SyncMetrics>,
}

impl Broadcaster {
    pub fn new(
        store: Arc<StateStore>,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            store,
            registry,
            metrics,
        }
    }

    pub async fn broadcast(&self) -> BroadcastReport {
        let snapshot = self.store.read().await;

        let mut delivered = 0;
        let mut lagged = 0;
        let mut closed: Vec<ConnectionId> = Vec::new();
        self.registry
            .for_each(|id, outbox| match outbox.deliver(snapshot.clone()) {
                Delivery::Queued => delivered += 1,
                Delivery::Lagged => {
                    debug!(
                        "[BROADCAST] Connection {} lagging, parked v{}",
                        id, snapshot.version
                    );
                    lagged += 1;
                }
                Delivery::Closed => closed.push(id),
            })
            .await;

        let mut pruned = 0;
        for id in closed {
            if self.registry.unregister(id).await {
                debug!("[BROADCAST] Dropping connection {} (channel closed)", id);
                self.metrics.connection_pruned();
                self.metrics.connection_closed();
                pruned += 1;
            }
        }

        self.metrics.broadcast_completed(delivered, lagged);
        debug!(
            "[BROADCAST] v{} delivered={} lagged={} pruned={}",
            snapshot.version, delivered, lagged, pruned
        );

        BroadcastReport {
            version: snapshot.version,
            delivered,
            lagged,
            pruned,
        }
    }
}
