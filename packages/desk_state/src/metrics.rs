//! Sync metrics
//!
//! Lock-free counters for the subscriber fan-out, read through `snapshot()`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct SyncMetrics {
    // Connection metrics
    /// Currently registered subscribers
    pub active_connections: AtomicU64,
    /// Subscribers registered since start
    pub total_connections: AtomicU64,
    /// Subscribers dropped because their channel was closed
    pub pruned_connections: AtomicU64,

    // Fan-out metrics
    /// Committed mutations
    pub mutations: AtomicU64,
    /// Broadcast passes run
    pub broadcasts: AtomicU64,
    /// Snapshots handed to subscriber channels
    pub deliveries: AtomicU64,
    /// Snapshots parked because a subscriber's queue was full
    pub lagged_deliveries: AtomicU64,

    // Error metrics
    /// Blob store write failures
    pub persistence_errors: AtomicU64,
    /// Milliseconds after start of the last write failure, plus one (0 = never)
    last_persistence_error: AtomicU64,

    start_time: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero so a double close cannot wrap the gauge.
    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn connection_pruned(&self) {
        self.pruned_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mutation_committed(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_completed(&self, delivered: usize, lagged: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        self.lagged_deliveries.fetch_add(lagged as u64, Ordering::Relaxed);
    }

    pub fn persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
        self.last_persistence_error.store(self.elapsed_ms() + 1, Ordering::Relaxed);
    }

    /// Whether a write failure happened less than `window` ago.
    pub fn persistence_error_within(&self, window: Duration) -> bool {
        match self.last_persistence_error.load(Ordering::Relaxed) {
            0 => false,
            at => {
                let age = self.elapsed_ms().saturating_sub(at - 1);
                u128::from(age) < window.as_millis()
            }
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                pruned: self.pruned_connections.load(Ordering::Relaxed),
            },
            fanout: FanoutMetrics {
                mutations: self.mutations.load(Ordering::Relaxed),
                broadcasts: self.broadcasts.load(Ordering::Relaxed),
                deliveries: self.deliveries.load(Ordering::Relaxed),
                lagged: self.lagged_deliveries.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                persistence: self.persistence_errors.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub fanout: FanoutMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub pruned: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutMetrics {
    pub mutations: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub lagged: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub persistence: u64,
}
