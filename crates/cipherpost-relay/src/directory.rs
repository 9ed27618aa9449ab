//! Identity directory and authentication
//!
//! Registration stores the public half of a client-generated key pair; the
//! relay never receives a private key.

use std::sync::Arc;

use cipherpost_core::{AuthSession, IdentitySummary, PresenceStatus, Timestamp, UserId, MAX_USERNAME_LEN};
use cipherpost_crypto::keys::PublicKeyPem;
use tracing::{debug, info, instrument};

use crate::error::{AuthError, RelayError, Result};
use crate::password::{hash_password, verify_password};
use crate::storage::{NewIdentity, RelayStorage};
use crate::token::TokenIssuer;

/// Directory of registered identities
pub struct Directory {
    storage: Arc<dyn RelayStorage>,
    tokens: TokenIssuer,
}

impl Directory {
    /// Create a directory over `storage`
    pub fn new(storage: Arc<dyn RelayStorage>, tokens: TokenIssuer) -> Self {
        Self { storage, tokens }
    }

    /// Register a new identity and return its session
    #[instrument(skip(self, password, public_key))]
    pub fn register(
        &self,
        username: &str,
        password: &str,
        public_key: PublicKeyPem,
    ) -> Result<AuthSession> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput("username and password are required".into()).into());
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(AuthError::InvalidInput(format!(
                "username longer than {MAX_USERNAME_LEN} characters"
            ))
            .into());
        }
        public_key
            .parse()
            .map_err(|e| AuthError::InvalidInput(format!("public key: {e}")))?;

        let record = self.storage.create_identity(NewIdentity {
            username: username.to_string(),
            password_hash: hash_password(password)?,
            public_key,
            status: PresenceStatus::Online,
        })?;

        info!(id = %record.id, "Registered identity");
        Ok(AuthSession {
            token: self.tokens.issue(record.id, Timestamp::now())?,
            user_id: record.id,
            username: record.username,
            public_key: None,
        })
    }

    /// Verify credentials, mark the identity online and return its session
    #[instrument(skip(self, password))]
    pub fn login(&self, username: &str, password: &str) -> Result<AuthSession> {
        let record = self
            .storage
            .identity_by_username(username.trim())?
            .filter(|r| verify_password(password, &r.password_hash))
            .ok_or(AuthError::InvalidCredentials)?;

        self.storage
            .set_status(record.id, PresenceStatus::Online, Timestamp::now())?;

        debug!(id = %record.id, "Login succeeded");
        Ok(AuthSession {
            token: self.tokens.issue(record.id, Timestamp::now())?,
            user_id: record.id,
            username: record.username,
            public_key: Some(record.public_key),
        })
    }

    /// Resolve an `Authorization` header to the authenticated identity
    pub fn authenticate(&self, header: Option<&str>) -> Result<UserId> {
        Ok(self.tokens.verify_header(header, Timestamp::now())?)
    }

    /// Every identity except `caller`
    pub fn list_others(&self, caller: UserId) -> Result<Vec<IdentitySummary>> {
        Ok(self
            .storage
            .identities()?
            .iter()
            .filter(|r| r.id != caller)
            .map(|r| r.summary())
            .collect())
    }

    /// Current public key registered for `username`
    pub fn public_key_for(&self, username: &str) -> Result<PublicKeyPem> {
        self.storage
            .identity_by_username(username)?
            .map(|r| r.public_key)
            .ok_or_else(|| RelayError::IdentityNotFound(username.to_string()))
    }

    /// Replace the caller's public key (key rotation)
    #[instrument(skip(self, public_key))]
    pub fn rotate_key(&self, caller: UserId, public_key: PublicKeyPem) -> Result<()> {
        public_key
            .parse()
            .map_err(|e| AuthError::InvalidInput(format!("public key: {e}")))?;
        self.storage.set_public_key(caller, public_key)?;
        info!(id = %caller, "Rotated public key");
        Ok(())
    }
}
