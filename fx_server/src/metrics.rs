//! Connection and stream gauges.
//!
//! Two independent counters:
//! - connections: subscribers currently in the `Open` state;
//! - streams: send attempts currently in flight inside a fan-out.
//!
//! A stream is counted through a [`StreamGuard`], so every increment is paired
//! with exactly one decrement regardless of how the send attempt ends.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use log::info;

/// Point-in-time copy of both gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Open subscriber connections.
    pub connections: i64,
    /// In-flight send attempts.
    pub streams: i64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connections={} streams={}", self.connections, self.streams)
    }
}

/// Dispatcher gauges.
#[derive(Debug, Default)]
pub struct Metrics {
    active_connections: AtomicI64,
    active_streams: AtomicI64,
}

impl Metrics {
    /// Create gauges starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    /// Count one in-flight send attempt until the returned guard is dropped.
    pub fn begin_stream(&self) -> StreamGuard<'_> {
        self.active_streams.fetch_add(1, Ordering::SeqCst);
        StreamGuard { metrics: self }
    }

    /// Open subscriber connections.
    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// In-flight send attempts.
    pub fn active_streams(&self) -> i64 {
        self.active_streams.load(Ordering::SeqCst)
    }

    /// Read both gauges.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections: self.active_connections(),
            streams: self.active_streams(),
        }
    }

    /// Read both gauges and log them. Used by the periodic reporter and on demand.
    pub fn report(&self) -> MetricsSnapshot {
        let snapshot = self.snapshot();
        info!("Active connections: {}", snapshot.connections);
        info!("Active streams: {}", snapshot.streams);
        snapshot
    }
}

/// Holds one unit of the stream gauge.
#[must_use = "the stream is uncounted as soon as the guard is dropped"]
pub struct StreamGuard<'a> {
    metrics: &'a Metrics,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.metrics.active_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
