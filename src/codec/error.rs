//! Codec error types

/// Failure of the encode/decode transform
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    /// Token is not valid hex
    #[error("token is not valid hex")]
    Encoding,
    /// Token is shorter than nonce plus tag
    #[error("token too short: {0} bytes")]
    TooShort(usize),
    /// Decryption or tag verification failed
    #[error("authentication failed")]
    Authentication,
    /// Decrypted payload is not UTF-8 text
    #[error("decoded payload is not UTF-8")]
    Utf8,
    /// Encryption failed
    #[error("encryption failed")]
    Seal,
}

/// A frame that could not be turned into a message
///
/// Both variants are skippable: the reader drops the line and carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The decode transform rejected the line
    #[error("undecodable frame: {0}")]
    BadTransform(#[from] CipherError),
    /// Decoded text did not split into the expected fields
    #[error("malformed frame: expected 4 fields, found {fields}")]
    BadStructure { fields: usize },
}
