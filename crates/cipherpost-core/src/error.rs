//! Error types for Cipherpost core

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] cipherpost_crypto::CryptoError),

    /// Envelope failed shape validation
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Message too large
    #[error("Message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge {
        /// Actual size in bytes
        size: usize,
        /// Permitted maximum
        max: usize,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(err: bincode::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
