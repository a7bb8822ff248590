//! Registry entry types
//!
//! A [`Sink`] wraps the outbound half of one connection. Writes are
//! serialized by an internal lock so frames from replay and from concurrent
//! broadcasts never interleave mid-line.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};

/// Stable handle for a registered sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(pub u64);

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Boxed outbound stream
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Outcome of a live write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkWrite {
    /// Frame was written and flushed
    Delivered,
    /// Frame was already sent during this sink's history replay
    AlreadyReplayed,
    /// Sink has been closed
    Closed,
}

struct SinkWriter {
    io: BoxedWriter,
    /// Lowest sequence number not covered by the history replay
    live_from: u64,
}

/// Outbound endpoint of one connection
pub struct Sink {
    id: SinkId,
    peer_addr: Option<SocketAddr>,
    writer: Mutex<SinkWriter>,
    closed: AtomicBool,
}

impl Sink {
    /// Wrap a writer as a sink
    ///
    /// Until a replay finishes, every sequence number counts as live.
    pub fn new(id: SinkId, peer_addr: Option<SocketAddr>, io: BoxedWriter) -> Self {
        Self {
            id,
            peer_addr,
            writer: Mutex::new(SinkWriter { io, live_from: 0 }),
            closed: AtomicBool::new(false),
        }
    }

    /// Sink handle
    pub fn id(&self) -> SinkId {
        self.id
    }

    /// Remote peer address, if the sink is a socket
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Whether the sink has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the sink closed; later writes are skipped
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Write a broadcast frame for the message with sequence number `seq`
    ///
    /// Waits for an in-progress replay to finish. Frames the replay already
    /// carried are skipped.
    pub async fn write_live(&self, seq: u64, frame: &[u8]) -> std::io::Result<SinkWrite> {
        let mut writer = self.writer.lock().await;

        if self.is_closed() {
            return Ok(SinkWrite::Closed);
        }
        if seq < writer.live_from {
            return Ok(SinkWrite::AlreadyReplayed);
        }

        writer.io.write_all(frame).await?;
        writer.io.flush().await?;
        Ok(SinkWrite::Delivered)
    }

    /// Take exclusive ownership of the writer for a history replay
    ///
    /// Live writes queue behind the returned guard until it is finished or
    /// dropped.
    pub async fn begin_replay(&self) -> ReplayGuard<'_> {
        ReplayGuard {
            writer: self.writer.lock().await,
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Exclusive write access held while replaying history to a sink
pub struct ReplayGuard<'a> {
    writer: MutexGuard<'a, SinkWriter>,
}

impl ReplayGuard<'_> {
    /// Write one replayed frame
    pub async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.writer.io.write_all(frame).await
    }

    /// Finish the replay
    ///
    /// `next_seq` is the first sequence number that was not part of the
    /// replayed snapshot; broadcasts below it are skipped from now on.
    pub async fn finish(mut self, next_seq: u64) -> std::io::Result<()> {
        self.writer.live_from = next_seq;
        self.writer.io.flush().await
    }
}
