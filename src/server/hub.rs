//! Broadcast hub
//!
//! The single path by which a message enters the relay: it is appended to
//! history (which fixes its place in the global order) and then written to
//! every registered sink, the sender's own included.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::codec::WireFramer;
use crate::history::HistoryStore;
use crate::message::Message;
use crate::registry::{ConnectionRegistry, SinkWrite};
use crate::stats::{ServerStats, StatsSnapshot};

/// Per-message fan-out result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// History sequence number assigned to the message
    pub seq: u64,
    /// Sinks that received the frame
    pub delivered: usize,
    /// Sinks whose write failed
    pub failed: usize,
    /// Sinks skipped because they already had the message from replay
    pub skipped: usize,
}

#[derive(Default)]
struct DeliveryCounts {
    delivered: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// Shared state handed to every connection worker
pub struct BroadcastHub {
    history: Arc<HistoryStore>,
    registry: Arc<ConnectionRegistry>,
    framer: WireFramer,
    stats: Arc<ServerStats>,
}

impl BroadcastHub {
    pub fn new(
        history: Arc<HistoryStore>,
        registry: Arc<ConnectionRegistry>,
        framer: WireFramer,
    ) -> Self {
        Self {
            history,
            registry,
            framer,
            stats: Arc::new(ServerStats::new()),
        }
    }

    /// Accept a message: append it to history, then fan it out
    ///
    /// A failed write to one sink is counted and ignored; it never stops
    /// delivery to the others. The failing connection is reaped by its own
    /// worker when its read side errors.
    pub async fn accept(&self, msg: Message) -> Delivery {
        let id = msg.id.clone();
        let encoded = self.framer.encode(&msg);
        let seq = self.history.append(msg).await;
        self.stats.message_accepted();

        let frame = match encoded {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(seq = seq, id = %id, error = %e, "Failed to encode broadcast frame");
                return Delivery {
                    seq,
                    ..Default::default()
                };
            }
        };

        let counts = DeliveryCounts::default();
        self.registry
            .for_each(|sink| {
                let frame = &frame;
                let counts = &counts;
                async move {
                    match sink.write_live(seq, frame).await {
                        Ok(SinkWrite::Delivered) => {
                            counts.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(SinkWrite::AlreadyReplayed) | Ok(SinkWrite::Closed) => {
                            counts.skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            counts.failed.fetch_add(1, Ordering::Relaxed);
                            self.stats.sink_write_failed();
                            tracing::debug!(
                                sink = %sink.id(),
                                seq = seq,
                                error = %e,
                                "Broadcast write failed"
                            );
                        }
                    }
                }
            })
            .await;

        let delivery = Delivery {
            seq,
            delivered: counts.delivered.into_inner(),
            failed: counts.failed.into_inner(),
            skipped: counts.skipped.into_inner(),
        };

        tracing::trace!(
            seq = seq,
            id = %id,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Message broadcast"
        );

        delivery
    }

    /// History store
    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Wire framer
    pub fn framer(&self) -> &WireFramer {
        &self.framer
    }

    /// Live counters
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Snapshot of all counters, including history write failures
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.history.write_failures())
    }
}
