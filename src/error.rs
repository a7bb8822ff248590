//! Crate error types
//!
//! Per-frame problems are reported through [`FrameError`] and never end a
//! session; everything that reaches [`Error`] is fatal for the operation that
//! produced it (a connection, or server startup).

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::codec::{CipherError, FrameError};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for server, client and history operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The durable history log could not be opened or read at startup
    #[error("failed to open history log {}: {source}", .path.display())]
    HistoryOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The listening socket could not be bound at startup
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Shared key has the wrong length or encoding
    #[error("invalid shared key: expected 32 bytes or 64 hex characters, got {0} characters")]
    InvalidKey(usize),

    /// Username would break the structural wire text
    #[error("username {0:?} must not be empty or contain '|'")]
    InvalidUsername(String),

    /// Outgoing frame is longer than the relay accepts
    #[error("message too long: frame is {len} bytes, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    /// A frame could not be encoded or decoded
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The encode/decode transform failed
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
}
