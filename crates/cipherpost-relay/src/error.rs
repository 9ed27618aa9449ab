//! Relay error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Envelope failed shape validation
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Durable write of an envelope failed; the envelope was dropped
    #[error("Failed to persist envelope: {0}")]
    Persist(String),

    /// A referenced identity does not exist
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    /// Directory lookup found nothing
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    /// Authentication or registration failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Authentication errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token supplied
    #[error("Missing bearer token")]
    MissingToken,

    /// Token is malformed or its signature does not verify
    #[error("Invalid token")]
    InvalidToken,

    /// Token signature is valid but the token has expired
    #[error("Token expired")]
    TokenExpired,

    /// Unknown username or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Username already registered
    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    /// Registration input rejected
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Password hashing failed
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl From<sled::Error> for RelayError {
    fn from(err: sled::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for RelayError {
    fn from(err: bincode::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}

impl From<cipherpost_core::CoreError> for RelayError {
    fn from(err: cipherpost_core::CoreError) -> Self {
        RelayError::InvalidEnvelope(err.to_string())
    }
}
