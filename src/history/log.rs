//! History log record format

use crate::message::Message;

/// Result of decoding a log image
#[derive(Debug, Clone, Default)]
pub struct DecodedLog {
    /// Complete records, oldest first
    pub messages: Vec<Message>,
    /// Byte offset just past the last complete record
    pub valid_len: usize,
    /// Whether anything other than whitespace follows `valid_len`
    pub stopped_early: bool,
    /// Whether the undecodable remainder is a single unterminated record
    ///
    /// Only such a tail is safe to cut off; a remainder spanning several
    /// lines may still hold complete records after the damaged one.
    pub has_partial_tail: bool,
}

/// Decode a log image front to back
///
/// Decoding stops at the first record that does not parse; nothing from
/// there on is returned, and none of it is an error.
pub fn decode_log(bytes: &[u8]) -> DecodedLog {
    let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<Message>();
    let mut decoded = DecodedLog::default();

    while let Some(Ok(msg)) = stream.next() {
        decoded.messages.push(msg);
        decoded.valid_len = stream.byte_offset();
    }

    let rest = &bytes[decoded.valid_len..];
    let start = rest
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let rest = &rest[start..];

    decoded.stopped_early = !rest.is_empty();
    decoded.has_partial_tail = decoded.stopped_early && !rest.contains(&b'\n');
    decoded
}

/// Serialize one record, newline-terminated
pub fn encode_record(msg: &Message) -> serde_json::Result<Vec<u8>> {
    let mut record = serde_json::to_vec(msg)?;
    record.push(b'\n');
    Ok(record)
}
