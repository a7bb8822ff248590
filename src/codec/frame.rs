//! Line framing and message encoding

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use super::cipher::Cipher;
use super::error::{CipherError, FrameError};
use crate::message::Message;

/// Line terminator
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default upper bound for a single line (64KB)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Splits an inbound byte stream into newline-terminated lines
///
/// Yields each line without its terminator (a trailing `\r` is also
/// dropped). A line longer than `max_length` is an I/O error, which ends the
/// stream for that connection. Bytes left over at EOF without a terminator
/// are yielded as a final line.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes already scanned for a terminator
    next_index: usize,
}

impl LineCodec {
    /// Create a codec with the given maximum line length
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    fn strip(mut line: BytesMut) -> Bytes {
        if line.last() == Some(&LINE_TERMINATOR) {
            line.truncate(line.len() - 1);
        }
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        line.freeze()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        let newline = src[self.next_index..]
            .iter()
            .position(|b| *b == LINE_TERMINATOR)
            .map(|offset| self.next_index + offset);

        match newline {
            Some(idx) => {
                self.next_index = 0;
                if idx > self.max_length {
                    return Err(frame_too_long(self.max_length));
                }
                let line = src.split_to(idx + 1);
                Ok(Some(Self::strip(line)))
            }
            None if src.len() > self.max_length => Err(frame_too_long(self.max_length)),
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if src.is_empty() {
            Ok(None)
        } else {
            let rest = src.split_to(src.len());
            Ok(Some(Self::strip(rest)))
        }
    }
}

fn frame_too_long(max: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("frame exceeds {} bytes", max),
    )
}

/// Converts messages to and from wire frames
///
/// Owns the shared [`Cipher`]; cheap to clone.
#[derive(Clone)]
pub struct WireFramer {
    cipher: Arc<dyn Cipher>,
}

impl WireFramer {
    /// Create a framer around the given transform
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        Self { cipher }
    }

    /// Encode a message as one terminated line
    pub fn encode(&self, msg: &Message) -> Result<Bytes, FrameError> {
        let token = self.cipher.seal(msg.to_wire_text().as_bytes())?;

        let mut frame = BytesMut::with_capacity(token.len() + 1);
        frame.extend_from_slice(token.as_bytes());
        frame.extend_from_slice(&[LINE_TERMINATOR]);
        Ok(frame.freeze())
    }

    /// Decode one line (terminator optional) into a message
    pub fn decode(&self, line: &[u8]) -> Result<Message, FrameError> {
        let mut line = line;
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line = &line[..line.len() - 1];
        }

        let token = std::str::from_utf8(line).map_err(|_| CipherError::Encoding)?;
        let plaintext = self.cipher.open(token)?;
        let text = String::from_utf8(plaintext).map_err(|_| CipherError::Utf8)?;

        Message::from_wire_text(&text)
    }
}

impl std::fmt::Debug for WireFramer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireFramer").finish_non_exhaustive()
    }
}
