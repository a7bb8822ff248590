//! History store implementation

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::log::{decode_log, encode_record};
use crate::error::{Error, Result};
use crate::message::Message;

/// Point-in-time copy of the history
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    /// All accepted messages, oldest first
    pub messages: Vec<Message>,
    /// Sequence number the next append will receive
    pub next_seq: u64,
}

/// Boxed durable log writer
pub type BoxedLog = Box<dyn AsyncWrite + Send + Unpin>;

struct HistoryInner {
    messages: Vec<Message>,
    log: BoxedLog,
    /// Second handle on the log file, used to cut back a failed write
    rollback: Option<File>,
    /// Log length after the last record known to be fully written
    durable_len: u64,
}

/// Append-only message history backed by a log file
///
/// The in-memory sequence and the log are updated under one lock, so a
/// [`snapshot`](Self::snapshot) never observes half of an append. The
/// position of a message in the sequence is its sequence number.
pub struct HistoryStore {
    inner: Mutex<HistoryInner>,
    path: PathBuf,
    write_failures: AtomicU64,
}

impl HistoryStore {
    /// Open (or create) the log at `path` and load its records
    ///
    /// A partial final record is cut off the file so later appends start on a
    /// clean record boundary. Damage followed by further records is left on
    /// disk untouched; loading just stops there.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| Error::HistoryOpen {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(open_err)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await.map_err(open_err)?;

        let decoded = decode_log(&bytes);
        if decoded.has_partial_tail {
            tracing::warn!(
                path = %path.display(),
                kept = decoded.messages.len(),
                discarded_bytes = bytes.len() - decoded.valid_len,
                "Discarding partial record at end of history log"
            );

            file.set_len(decoded.valid_len as u64)
                .await
                .map_err(open_err)?;
            if decoded.valid_len > 0 {
                file.write_all(b"\n").await.map_err(open_err)?;
                file.flush().await.map_err(open_err)?;
            }
        } else if decoded.stopped_early {
            tracing::warn!(
                path = %path.display(),
                kept = decoded.messages.len(),
                unread_bytes = bytes.len() - decoded.valid_len,
                "History log has an unreadable record, later records are not loaded"
            );
        }

        tracing::info!(
            path = %path.display(),
            messages = decoded.messages.len(),
            "History loaded"
        );

        let durable_len = file.metadata().await.map_err(open_err)?.len();
        let rollback = file.try_clone().await.map_err(open_err)?;

        Ok(Self {
            inner: Mutex::new(HistoryInner {
                messages: decoded.messages,
                log: Box::new(file),
                rollback: Some(rollback),
                durable_len,
            }),
            path,
            write_failures: AtomicU64::new(0),
        })
    }

    /// Build a store over an arbitrary log writer with an empty history
    ///
    /// `path` is only consulted by [`load`](Self::load). Failed writes cannot
    /// be rolled back on such a store.
    pub fn with_log(path: impl Into<PathBuf>, log: BoxedLog) -> Self {
        Self {
            inner: Mutex::new(HistoryInner {
                messages: Vec::new(),
                log,
                rollback: None,
                durable_len: 0,
            }),
            path: path.into(),
            write_failures: AtomicU64::new(0),
        }
    }

    /// Replay the durable log from disk
    ///
    /// Stops quietly at the first record that does not decode.
    pub async fn load(&self) -> Result<Vec<Message>> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(decode_log(&bytes).messages)
    }

    /// Append a message, returning its sequence number
    ///
    /// A failed log write is logged and counted; the message is still part of
    /// the in-memory history. The log is cut back to its last complete record
    /// so later appends are not glued onto a fragment.
    pub async fn append(&self, msg: Message) -> u64 {
        let record = encode_record(&msg);

        let mut inner = self.inner.lock().await;
        let seq = inner.messages.len() as u64;
        let id = msg.id.clone();
        inner.messages.push(msg);

        let written = match record {
            Ok(record) => write_record(&mut inner.log, &record)
                .await
                .map(|()| record.len() as u64),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        };

        match written {
            Ok(len) => inner.durable_len += len,
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    seq = seq,
                    id = %id,
                    error = %e,
                    "Failed to persist message, continuing from memory"
                );

                if let Some(file) = &inner.rollback {
                    if let Err(e) = file.set_len(inner.durable_len).await {
                        tracing::warn!(error = %e, "Failed to roll back partial history record");
                    }
                }
            }
        }

        seq
    }

    /// Consistent copy of the full history
    pub async fn snapshot(&self) -> HistorySnapshot {
        let inner = self.inner.lock().await;
        HistorySnapshot {
            messages: inner.messages.clone(),
            next_seq: inner.messages.len() as u64,
        }
    }

    /// Number of messages in history
    pub async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }

    /// Whether the history is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Path of the backing log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of log writes that failed since open
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

async fn write_record(log: &mut BoxedLog, record: &[u8]) -> std::io::Result<()> {
    log.write_all(record).await?;
    log.flush().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn msg(user: &str, content: &str, id: &str, minute: u32) -> Message {
        Message::from_parts(
            user,
            content,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            id,
        )
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_open_creates_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let store = HistoryStore::open(&path).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
        assert!(store.is_empty().await);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_fails_for_unopenable_path() {
        let dir = tempfile::tempdir().unwrap();

        // A directory cannot be opened as the log file
        let result = HistoryStore::open(dir.path()).await;
        assert!(matches!(result, Err(Error::HistoryOpen { .. })));
    }

    #[tokio::test]
    async fn test_append_assigns_sequence_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let store = HistoryStore::open(&path).await.unwrap();

        assert_eq!(store.append(msg("alice", "hi", "id1", 1)).await, 0);
        assert_eq!(store.append(msg("bob", "yo", "id2", 2)).await, 1);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.next_seq, 2);
        assert_eq!(ids(&snapshot.messages), ["id1", "id2"]);
        assert_eq!(ids(&store.load().await.unwrap()), ["id1", "id2"]);
        assert_eq!(store.write_failures(), 0);
    }

    #[tokio::test]
    async fn test_reopen_replays_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        {
            let store = HistoryStore::open(&path).await.unwrap();
            store.append(msg("alice", "hi", "id1", 1)).await;
            store.append(msg("bob", "yo", "id2", 2)).await;
            store.append(msg("alice", "bye", "id3", 3)).await;
        }

        let store = HistoryStore::open(&path).await.unwrap();
        let snapshot = store.snapshot().await;

        assert_eq!(ids(&snapshot.messages), ["id1", "id2", "id3"]);
        assert_eq!(snapshot.messages[2].content, "bye");
        assert_eq!(snapshot.messages[1].username, "bob");
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let store = HistoryStore::open(&path).await.unwrap();
        store.append(msg("alice", "hi", "id1", 1)).await;
        store.append(msg("bob", "yo", "id2", 2)).await;

        let first = store.load().await.unwrap();
        let second = store.load().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ids(&first), ["id1", "id2"]);
    }

    #[tokio::test]
    async fn test_truncated_log_is_tolerated_and_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        {
            let store = HistoryStore::open(&path).await.unwrap();
            store.append(msg("alice", "hi", "id1", 1)).await;
            store.append(msg("bob", "yo", "id2", 2)).await;
            store.append(msg("alice", "bye", "id3", 3)).await;
        }

        // Chop the final record in half
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 20]).unwrap();

        let store = HistoryStore::open(&path).await.unwrap();
        assert_eq!(ids(&store.snapshot().await.messages), ["id1", "id2"]);

        // New appends land after the last complete record
        store.append(msg("carol", "back", "id4", 4)).await;
        assert_eq!(ids(&store.load().await.unwrap()), ["id1", "id2", "id4"]);

        drop(store);
        let reopened = HistoryStore::open(&path).await.unwrap();
        assert_eq!(ids(&reopened.snapshot().await.messages), ["id1", "id2", "id4"]);
    }

    #[tokio::test]
    async fn test_damaged_middle_record_keeps_later_records_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut log = encode_record(&msg("alice", "hi", "id1", 1)).unwrap();
        log.extend(b"{\"username\":\"bo\n");
        log.extend(encode_record(&msg("carol", "later", "id3", 3)).unwrap());
        std::fs::write(&path, &log).unwrap();

        let store = HistoryStore::open(&path).await.unwrap();

        // Loading stops at the damage, but nothing is deleted
        assert_eq!(ids(&store.snapshot().await.messages), ["id1"]);
        assert_eq!(std::fs::read(&path).unwrap(), log);
    }

    #[tokio::test]
    async fn test_failed_write_is_counted_and_kept_in_memory() {
        let log = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            ))
            .build();
        let store = HistoryStore::with_log("unused.json", Box::new(log));

        let seq = store.append(msg("alice", "hi", "id1", 1)).await;

        assert_eq!(seq, 0);
        assert_eq!(store.write_failures(), 1);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.next_seq, 1);
        assert_eq!(ids(&snapshot.messages), ["id1"]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_match_log_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let store = Arc::new(HistoryStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for writer in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for n in 0..25 {
                    let id = format!("w{}-{}", writer, n);
                    store.append(msg("user", "body", &id, 0)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = store.snapshot().await;
        let durable = store.load().await.unwrap();

        assert_eq!(snapshot.messages.len(), 200);
        assert_eq!(ids(&snapshot.messages), ids(&durable));
    }
}
