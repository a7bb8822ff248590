//! Chat relay server
//!
//! ```text
//!   TcpListener ──accept──► Connection (one task per peer)
//!                              │  replay history, then read lines
//!                              ▼
//!                         BroadcastHub::accept
//!                           │            │
//!                 HistoryStore::append   ConnectionRegistry ──► every Sink
//! ```

pub mod config;
pub mod connection;
pub mod hub;
pub mod listener;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionPhase};
pub use hub::{BroadcastHub, Delivery};
pub use listener::{shutdown_signal, ChatServer};
