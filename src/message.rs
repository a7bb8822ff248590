//! Chat message model
//!
//! A [`Message`] is the immutable record relayed between participants and
//! appended to the history log. On the wire it travels as the structural text
//! `username|content|timestamp|id`, split into at most four parts so that any
//! separator inside `content` is kept verbatim.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::FrameError;

/// Separator between the structural fields
pub const FIELD_SEPARATOR: char = '|';

/// Number of structural fields in the wire text
pub const FIELD_COUNT: usize = 4;

/// A single chat message
///
/// Equality and hashing only consider `id`; two records with the same id are
/// the same message for deduplication purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Sender's display name
    pub username: String,
    /// Message body (may contain the separator)
    pub content: String,
    /// Send time as stamped by the producer
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    /// Producer-assigned identity, conventionally `username-<nanos>`
    pub id: String,
}

impl Message {
    /// Create a message stamped with the current time and a fresh id
    pub fn new(username: impl Into<String>, content: impl Into<String>) -> Self {
        let username = username.into();
        let timestamp = Utc::now();
        let id = message_id(&username, timestamp);

        Self {
            username,
            content: content.into(),
            timestamp,
            id,
        }
    }

    /// Build a message from already-known parts
    pub fn from_parts(
        username: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            content: content.into(),
            timestamp,
            id: id.into(),
        }
    }

    /// Render the structural wire text (before the encode transform)
    pub fn to_wire_text(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.username,
            self.content,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.id,
            sep = FIELD_SEPARATOR,
        )
    }

    /// Parse the structural wire text
    ///
    /// Only the first three separators are structural. A timestamp that does
    /// not parse as RFC 3339 is replaced by the Unix epoch rather than
    /// rejecting the message.
    pub fn from_wire_text(text: &str) -> Result<Self, FrameError> {
        let parts: Vec<&str> = text.splitn(FIELD_COUNT, FIELD_SEPARATOR).collect();
        if parts.len() != FIELD_COUNT {
            return Err(FrameError::BadStructure {
                fields: parts.len(),
            });
        }

        let timestamp = match DateTime::parse_from_rfc3339(parts[2]) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                tracing::debug!(raw = parts[2], error = %e, "Unparseable timestamp, using epoch");
                DateTime::<Utc>::UNIX_EPOCH
            }
        };

        Ok(Self {
            username: parts[0].to_string(),
            content: parts[1].to_string(),
            timestamp,
            id: parts[3].to_string(),
        })
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Conventional message id: `username-<unix nanos>`
pub fn message_id(username: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", username, at.timestamp_nanos_opt().unwrap_or_default())
}

/// Check that a username survives the structural encoding
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && !username.contains(FIELD_SEPARATOR)
}
