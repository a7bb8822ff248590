//! Encode/decode transform
//!
//! The relay treats confidentiality as a pluggable [`Cipher`]. The default
//! [`AesGcmCipher`] seals each payload with AES-256-GCM under a pre-shared key
//! and a fresh random nonce, so identical plaintexts never produce the same
//! token.
//!
//! # Token Format
//!
//! ```text
//! hex( nonce[12] || ciphertext || tag[16] )
//! ```

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

use super::error::CipherError;
use crate::error::{Error, Result};

/// Nonce size for AES-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-GCM
const TAG_SIZE: usize = 16;

/// Key size for AES-256
pub const KEY_SIZE: usize = 32;

/// Reversible transform applied to every line on the wire
pub trait Cipher: Send + Sync + 'static {
    /// Encode plaintext into a single-line token
    fn seal(&self, plaintext: &[u8]) -> std::result::Result<String, CipherError>;

    /// Decode a token produced by [`Cipher::seal`]
    fn open(&self, token: &str) -> std::result::Result<Vec<u8>, CipherError>;
}

/// Pre-shared symmetric key
#[derive(Clone)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    /// Create a key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a key from 32 raw characters or 64 hex characters
    pub fn parse(input: &str) -> Result<Self> {
        let mut bytes = [0u8; KEY_SIZE];

        if input.len() == KEY_SIZE * 2 {
            if hex::decode_to_slice(input, &mut bytes).is_ok() {
                return Ok(Self(bytes));
            }
        } else if input.len() == KEY_SIZE {
            bytes.copy_from_slice(input.as_bytes());
            return Ok(Self(bytes));
        }

        Err(Error::InvalidKey(input.len()))
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// AES-256-GCM transform with hex-encoded tokens
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Create a cipher for the given key
    pub fn new(key: &SharedKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }
}

impl Cipher for AesGcmCipher {
    fn seal(&self, plaintext: &[u8]) -> std::result::Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CipherError::Seal)?;

        let mut token = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&ciphertext);

        Ok(hex::encode(token))
    }

    fn open(&self, token: &str) -> std::result::Result<Vec<u8>, CipherError> {
        let raw = hex::decode(token.trim()).map_err(|_| CipherError::Encoding)?;

        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::TooShort(raw.len()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Authentication)
    }
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmCipher").finish_non_exhaustive()
    }
}
