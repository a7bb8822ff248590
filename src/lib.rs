//! Real-time text relay with persistent history
//!
//! Every message a participant sends is delivered to every connected
//! participant, the sender included, and appended to an on-disk history that
//! late joiners receive in full before any live traffic.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use chat_relay::codec::{AesGcmCipher, SharedKey};
//! use chat_relay::{ChatServer, ServerConfig};
//!
//! # async fn example() -> chat_relay::Result<()> {
//! let key = SharedKey::parse("12345678901234567890123456789012")?;
//! let config = ServerConfig::default().history_path("chat_history.json");
//!
//! let server = ChatServer::bind(config, Arc::new(AesGcmCipher::new(&key))).await?;
//! server.run().await
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod history;
pub mod message;
pub mod registry;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use message::Message;
pub use server::{ChatServer, ServerConfig};
