//! Persistent chat history
//!
//! Every accepted message is appended to an in-memory sequence and mirrored to
//! an append-only log of JSON records, one per line. New connections replay a
//! [`HistorySnapshot`] before they receive live traffic.
//!
//! # Durability
//!
//! ```text
//!   append(msg) ──► lock ──► messages.push(msg) ──► log.write(json + '\n') ──► unlock
//! ```
//!
//! A failed log write is logged and counted but the in-memory append stands:
//! the relay keeps serving with degraded durability rather than dropping the
//! message. The fragment of a failed write is cut back off the log, and on
//! startup a log whose last record was cut short is trimmed the same way. A
//! damaged record with complete records after it is never deleted; loading
//! simply stops there.

pub mod log;
pub mod store;

pub use log::{decode_log, DecodedLog};
pub use store::{BoxedLog, HistorySnapshot, HistoryStore};
