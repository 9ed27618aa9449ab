//! Error types for cryptographic operations

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key pair generation failed (entropy or backend failure)
    #[error("Key generation failed: {0}")]
    KeyGen(String),

    /// Symmetric decryption failed (bad padding, malformed input)
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Wrapping a session key under a public key failed
    #[error("Key wrap failed: {0}")]
    Wrap(String),

    /// Unwrapping a session key failed (wrong private key or bad padding)
    #[error("Key unwrap failed: {0}")]
    Unwrap(String),

    /// A PEM key could not be parsed or encoded
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid length for a fixed-size value
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Required length in bytes
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// Hex or UTF-8 decoding failed
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<hex::FromHexError> for CryptoError {
    fn from(err: hex::FromHexError) -> Self {
        CryptoError::Encoding(err.to_string())
    }
}
