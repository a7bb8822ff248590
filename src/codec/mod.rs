//! Wire framing
//!
//! One message travels as one newline-terminated line. The line payload is the
//! output of a [`Cipher`] applied to the message's structural text:
//!
//! ```text
//!   Message ──► "alice|hi|2024-03-01T12:30:00Z|alice-1" ──► seal() ──► hex token + '\n'
//!
//!   '\n'-split line ──► open() ──► structural text ──► Message
//! ```
//!
//! [`LineCodec`] handles the newline splitting on the read side and
//! [`WireFramer`] handles the transform plus the structural text.

pub mod cipher;
pub mod error;
pub mod frame;

pub use cipher::{AesGcmCipher, Cipher, SharedKey};
pub use error::{CipherError, FrameError};
pub use frame::{LineCodec, WireFramer, DEFAULT_MAX_FRAME_LENGTH};
