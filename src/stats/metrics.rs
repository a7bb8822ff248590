//! Statistics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Server-wide counters
///
/// Updated lock-free from the listener, workers and the broadcast hub.
#[derive(Debug)]
pub struct ServerStats {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,
    messages_accepted: AtomicU64,
    frames_rejected: AtomicU64,
    sink_write_failures: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            messages_accepted: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            sink_write_failures: AtomicU64::new(0),
        }
    }

    /// Record an accepted connection
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed connection
    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Record a connection turned away at the limit
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message accepted into history
    pub fn message_accepted(&self) {
        self.messages_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound line that was skipped
    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed write to one sink
    pub fn sink_write_failed(&self) {
        self.sink_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the server started
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Copy the current counter values
    ///
    /// `history_write_failures` is owned by the history store and passed in.
    pub fn snapshot(&self, history_write_failures: u64) -> StatsSnapshot {
        StatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            messages_accepted: self.messages_accepted.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            sink_write_failures: self.sink_write_failures.load(Ordering::Relaxed),
            history_write_failures,
            uptime: self.uptime(),
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`ServerStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current live connections
    pub active_connections: u64,
    /// Connections refused by the connection limit
    pub rejected_connections: u64,
    /// Messages appended to history and broadcast
    pub messages_accepted: u64,
    /// Inbound lines skipped as undecodable or malformed
    pub frames_rejected: u64,
    /// Per-sink broadcast writes that failed
    pub sink_write_failures: u64,
    /// Log writes that failed (messages kept in memory only)
    pub history_write_failures: u64,
    /// Uptime at snapshot time
    pub uptime: Duration,
}
