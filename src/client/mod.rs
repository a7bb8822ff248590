//! Chat client implementation
//!
//! Provides the participant side of the relay protocol:
//! - Connecting and receiving the replayed history
//! - Sending messages with conventional ids
//! - Deduplicating by id, since the relay echoes every message to its sender

pub mod config;
pub mod connector;
pub mod transcript;

pub use config::ClientConfig;
pub use connector::ChatClient;
pub use transcript::Transcript;
