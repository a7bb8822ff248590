//! Connection registry for broadcast fan-out
//!
//! The registry tracks the write side of every live connection. Each entry is
//! a [`Sink`] keyed by a stable [`SinkId`] handed out at registration and
//! removed exactly once when the connection closes.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<ConnectionRegistry>
//!                   ┌───────────────────────────┐
//!                   │ sinks: HashMap<SinkId,    │
//!                   │   Arc<Sink> {             │
//!                   │     writer: Mutex<..>,    │
//!                   │     live_from,            │
//!                   │   }                       │
//!                   │ >                         │
//!                   └─────────────┬─────────────┘
//!                                 │ members()
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!    [Sink 1]                [Sink 2]                [Sink 3]
//!    write_live()            write_live()            write_live()
//!         │                       │                       │
//!        TCP                     TCP                     TCP
//! ```
//!
//! Iteration works on a cloned member list, so membership changes never wait
//! on a slow socket and a sink removed mid-iteration is simply skipped.

pub mod sink;
pub mod store;

pub use sink::{BoxedWriter, ReplayGuard, Sink, SinkId, SinkWrite};
pub use store::ConnectionRegistry;
