//! Client error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] cipherpost_core::CoreError),

    /// Crypto error (key generation or wrapping)
    #[error("Crypto error: {0}")]
    Crypto(#[from] cipherpost_crypto::CryptoError),

    /// The recipient's current public key could not be fetched
    #[error("Directory lookup failed: {0}")]
    DirectoryLookup(String),

    /// Invalid credentials, duplicate username or rejected token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or realtime channel failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// No identity in the directory matches the requested username
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// No partner selected
    #[error("No conversation partner selected")]
    NoPartner,

    /// Empty or whitespace-only message
    #[error("Message is empty")]
    EmptyMessage,

    /// Operation requires a logged-in session
    #[error("Not logged in")]
    NotLoggedIn,

    /// Local storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<sled::Error> for ClientError {
    fn from(err: sled::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}
