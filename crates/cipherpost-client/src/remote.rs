//! Remote collaborators of a chat session
//!
//! The directory (identities and public keys) and the message transport
//! (submission and history) are reached through these traits, so the session
//! logic runs unchanged over HTTP, an in-process relay or a mock.

use async_trait::async_trait;
use cipherpost_core::{AuthSession, Envelope, IdentitySummary, StoredEnvelope, UserId};
use cipherpost_crypto::keys::PublicKeyPem;

use crate::error::Result;

/// Directory and authentication service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Register a new identity with its public key
    async fn register(
        &self,
        username: &str,
        password: &str,
        public_key: &PublicKeyPem,
    ) -> Result<AuthSession>;

    /// Authenticate an existing identity
    async fn login(&self, username: &str, password: &str) -> Result<AuthSession>;

    /// Every identity other than the caller
    async fn list_identities(&self, token: &str) -> Result<Vec<IdentitySummary>>;

    /// Current public key registered for `username`
    async fn public_key(&self, token: &str, username: &str) -> Result<PublicKeyPem>;

    /// Replace the caller's public key
    async fn rotate_key(&self, token: &str, public_key: &PublicKeyPem) -> Result<()>;
}

/// Envelope submission and history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Submit an envelope for persistence and redistribution.
    ///
    /// Success means the envelope was handed to the relay, not that it was
    /// persisted.
    async fn submit(&self, envelope: Envelope) -> Result<()>;

    /// Persisted envelopes between the caller and `partner`, oldest first
    async fn history(&self, token: &str, partner: UserId) -> Result<Vec<StoredEnvelope>>;
}
