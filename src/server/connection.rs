//! Per-connection worker
//!
//! Drives one connection through its lifecycle:
//!
//! ```text
//!   Connected ──► ReplayingHistory ──► Live ──► Closed
//! ```
//!
//! While replaying, the worker holds its sink's write lock, so broadcasts
//! accepted in the meantime queue up behind the replay and any of them that
//! the replayed snapshot already contained are dropped. In `Live` the worker
//! reads lines, decodes them and hands valid messages to the hub; its sink
//! keeps receiving every broadcast until the connection closes.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use super::hub::BroadcastHub;
use crate::codec::LineCodec;
use crate::error::Result;
use crate::registry::{BoxedWriter, Sink, SinkId};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Accepted, not yet registered
    Connected,
    /// Registered; history is being written to the sink
    ReplayingHistory,
    /// Reading inbound frames and receiving broadcasts
    Live,
    /// Unregistered; terminal
    Closed,
}

/// Worker for one accepted connection
pub struct Connection<R> {
    phase: ConnectionPhase,
    reader: FramedRead<R, LineCodec>,
    sink: Arc<Sink>,
    hub: Arc<BroadcastHub>,
}

impl<R> Connection<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create a worker for the given read and write halves
    pub fn new(
        hub: Arc<BroadcastHub>,
        peer_addr: Option<SocketAddr>,
        reader: R,
        writer: BoxedWriter,
        max_frame_length: usize,
    ) -> Self {
        let sink = hub.registry().create_sink(peer_addr, writer);

        Self {
            phase: ConnectionPhase::Connected,
            reader: FramedRead::new(reader, LineCodec::new(max_frame_length)),
            sink,
            hub,
        }
    }

    /// Handle of this connection's sink
    pub fn sink_id(&self) -> SinkId {
        self.sink.id()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Run the connection to completion
    ///
    /// Returns `Ok(())` when the peer closes the connection and an error on
    /// a transport failure. Either way the sink is unregistered before this
    /// returns.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.serve().await;
        self.close().await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        self.replay_history().await?;
        self.phase = ConnectionPhase::Live;
        self.read_loop().await
    }

    async fn replay_history(&mut self) -> Result<()> {
        self.phase = ConnectionPhase::ReplayingHistory;

        let mut replay = self.sink.begin_replay().await;
        self.hub.registry().register(Arc::clone(&self.sink)).await;
        let snapshot = self.hub.history().snapshot().await;

        for msg in &snapshot.messages {
            match self.hub.framer().encode(msg) {
                Ok(frame) => replay.write_frame(&frame).await?,
                Err(e) => {
                    tracing::warn!(sink = %self.sink.id(), id = %msg.id, error = %e, "Skipping unencodable history entry");
                }
            }
        }
        replay.finish(snapshot.next_seq).await?;

        tracing::debug!(
            sink = %self.sink.id(),
            replayed = snapshot.messages.len(),
            "History replay complete"
        );

        Ok(())
    }

    async fn read_loop(&mut self) -> Result<()> {
        while let Some(line) = self.reader.next().await {
            let line = line?;

            match self.hub.framer().decode(&line) {
                Ok(msg) => {
                    self.hub.accept(msg).await;
                }
                Err(e) => {
                    self.hub.stats().frame_rejected();
                    tracing::debug!(
                        sink = %self.sink.id(),
                        len = line.len(),
                        error = %e,
                        "Skipping bad frame"
                    );
                }
            }
        }

        Ok(())
    }

    async fn close(&mut self) {
        if self.phase == ConnectionPhase::Closed {
            return;
        }

        self.phase = ConnectionPhase::Closed;
        self.sink.close();
        self.hub.registry().unregister(self.sink.id()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    use super::*;
    use crate::codec::{AesGcmCipher, Cipher, SharedKey, WireFramer};
    use crate::history::HistoryStore;
    use crate::message::Message;
    use crate::registry::ConnectionRegistry;

    const KEY: [u8; 32] = [5u8; 32];

    /// Client side of an in-memory connection
    struct Peer {
        lines: FramedRead<ReadHalf<DuplexStream>, LineCodec>,
        writer: WriteHalf<DuplexStream>,
    }

    async fn hub() -> (Arc<BroadcastHub>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::open(dir.path().join("history.json"))
            .await
            .unwrap();
        let hub = BroadcastHub::new(
            Arc::new(history),
            Arc::new(ConnectionRegistry::new()),
            WireFramer::new(Arc::new(AesGcmCipher::new(&SharedKey::from_bytes(KEY)))),
        );
        (Arc::new(hub), dir)
    }

    fn spawn_worker(hub: &Arc<BroadcastHub>) -> (Peer, tokio::task::JoinHandle<Result<()>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);

        let mut connection = Connection::new(
            Arc::clone(hub),
            None,
            server_read,
            Box::new(server_write),
            1024,
        );
        let handle = tokio::spawn(async move { connection.run().await });

        let peer = Peer {
            lines: FramedRead::new(client_read, LineCodec::default()),
            writer: client_write,
        };
        (peer, handle)
    }

    fn msg(user: &str, content: &str, id: &str, minute: u32) -> Message {
        Message::from_parts(
            user,
            content,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            id,
        )
    }

    async fn recv(hub: &BroadcastHub, peer: &mut Peer) -> Message {
        let line = tokio::time::timeout(Duration::from_secs(2), peer.lines.next())
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .unwrap();
        hub.framer().decode(&line).unwrap()
    }

    async fn send(hub: &BroadcastHub, peer: &mut Peer, msg: &Message) {
        let frame = hub.framer().encode(msg).unwrap();
        peer.writer.write_all(&frame).await.unwrap();
    }

    async fn wait_for_history(hub: &BroadcastHub, len: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.history().len().await < len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("history did not grow");
    }

    #[tokio::test]
    async fn test_replays_history_in_order_before_live_traffic() {
        let (hub, _dir) = hub().await;
        hub.history().append(msg("alice", "hi", "id1", 1)).await;
        hub.history().append(msg("bob", "yo", "id2", 2)).await;
        hub.history().append(msg("alice", "bye", "id3", 3)).await;

        let (mut peer, _handle) = spawn_worker(&hub);

        let first = recv(&hub, &mut peer).await;
        assert_eq!((first.username.as_str(), first.content.as_str()), ("alice", "hi"));
        let second = recv(&hub, &mut peer).await;
        assert_eq!((second.username.as_str(), second.content.as_str()), ("bob", "yo"));
        let third = recv(&hub, &mut peer).await;
        assert_eq!((third.username.as_str(), third.content.as_str()), ("alice", "bye"));

        hub.accept(msg("carol", "live", "id4", 4)).await;
        assert_eq!(recv(&hub, &mut peer).await.id, "id4");
    }

    #[tokio::test]
    async fn test_sender_receives_own_message() {
        let (hub, _dir) = hub().await;
        let (mut peer, _handle) = spawn_worker(&hub);

        send(&hub, &mut peer, &msg("alice", "echo", "id1", 1)).await;

        let echoed = recv(&hub, &mut peer).await;
        assert_eq!(echoed.id, "id1");
        assert_eq!(echoed.content, "echo");
        assert_eq!(hub.history().len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped_without_disconnect() {
        let (hub, _dir) = hub().await;
        let (mut peer, handle) = spawn_worker(&hub);

        // Undecodable token
        peer.writer.write_all(b"zz-not-a-token\n").await.unwrap();
        // Decodable, but only two fields
        let cipher = AesGcmCipher::new(&SharedKey::from_bytes(KEY));
        let token = cipher.seal(b"alice|two fields").unwrap();
        peer.writer
            .write_all(format!("{}\n", token).as_bytes())
            .await
            .unwrap();
        // Empty line
        peer.writer.write_all(b"\n").await.unwrap();

        send(&hub, &mut peer, &msg("alice", "still here", "id1", 1)).await;

        assert_eq!(recv(&hub, &mut peer).await.id, "id1");
        assert_eq!(hub.history().len().await, 1);
        assert_eq!(hub.stats_snapshot().frames_rejected, 3);
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn test_close_unregisters_sink() {
        let (hub, _dir) = hub().await;
        let (mut peer, handle) = spawn_worker(&hub);

        send(&hub, &mut peer, &msg("alice", "hi", "id1", 1)).await;
        recv(&hub, &mut peer).await;
        assert_eq!(hub.registry().len().await, 1);

        peer.writer.shutdown().await.unwrap();
        handle.await.unwrap().unwrap();

        assert!(hub.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_oversized_line_closes_connection() {
        let (hub, _dir) = hub().await;
        let (mut peer, handle) = spawn_worker(&hub);

        peer.writer.write_all(&[b'a'; 2048]).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
        assert!(hub.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_message_from_one_peer_reaches_another() {
        let (hub, _dir) = hub().await;
        let (mut alice, _a) = spawn_worker(&hub);
        let (mut bob, _b) = spawn_worker(&hub);

        // Wait until both sinks are registered
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.registry().len().await < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        send(&hub, &mut alice, &msg("alice", "hello bob", "id1", 1)).await;
        wait_for_history(&hub, 1).await;

        assert_eq!(recv(&hub, &mut bob).await.content, "hello bob");
        assert_eq!(recv(&hub, &mut alice).await.content, "hello bob");
    }

    #[tokio::test]
    async fn test_join_during_traffic_sees_each_message_once() {
        let (hub, _dir) = hub().await;
        for n in 0..20 {
            hub.history()
                .append(msg("seed", "old", &format!("old-{}", n), 0))
                .await;
        }

        // Keep accepting while the new peer joins
        let writer_hub = Arc::clone(&hub);
        let writer = tokio::spawn(async move {
            for n in 0..50 {
                writer_hub
                    .accept(msg("busy", "new", &format!("new-{}", n), 1))
                    .await;
                tokio::task::yield_now().await;
            }
        });

        let (mut peer, _handle) = spawn_worker(&hub);
        writer.await.unwrap();

        let total = hub.history().len().await;
        let mut seen = Vec::with_capacity(total);
        while seen.len() < total {
            seen.push(recv(&hub, &mut peer).await.id);
        }

        let expected: Vec<String> = hub
            .history()
            .snapshot()
            .await
            .messages
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_phase_is_closed_after_run() {
        let (hub, _dir) = hub().await;
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let mut connection = Connection::new(
            Arc::clone(&hub),
            None,
            server_read,
            Box::new(server_write),
            1024,
        );
        assert_eq!(connection.phase(), ConnectionPhase::Connected);

        drop(client);
        connection.run().await.unwrap();

        assert_eq!(connection.phase(), ConnectionPhase::Closed);
        assert!(!hub.registry().contains(connection.sink_id()).await);
    }
}
