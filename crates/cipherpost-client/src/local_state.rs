//! Client-local persisted state
//!
//! Everything a client keeps between runs: the auth session, private keys
//! and the plaintext of messages it sent. Sent plaintext is keyed by the
//! envelope's IV, because the sender cannot unwrap a session key wrapped
//! for the recipient. All of it is cleared together by [`LocalState::reset`].

use std::collections::HashMap;
use std::path::Path;

use cipherpost_core::AuthSession;
use parking_lot::RwLock;
use tracing::info;

use crate::error::Result;
use crate::keystore::{KeyStore, MemoryKeyStore, SledKeyStore};

const SESSION_KEY: &[u8] = b"current";

fn iv_key(iv_hex: &str) -> String {
    iv_hex.trim().to_ascii_lowercase()
}

/// Client-local state
pub trait LocalState: Send + Sync {
    /// Private key store
    fn keys(&self) -> &dyn KeyStore;

    /// Cached auth session (token and profile)
    fn session(&self) -> Result<Option<AuthSession>>;

    /// Replace the cached auth session
    fn set_session(&self, session: &AuthSession) -> Result<()>;

    /// Remember the plaintext of a sent message
    fn remember_sent(&self, iv_hex: &str, plaintext: &str) -> Result<()>;

    /// Plaintext of a sent message, by IV
    fn sent_plaintext(&self, iv_hex: &str) -> Result<Option<String>>;

    /// Clear session, keys and sent-message cache
    fn reset(&self) -> Result<()>;
}

/// In-memory local state (for testing)
#[derive(Default)]
pub struct MemoryLocalState {
    keys: MemoryKeyStore,
    session: RwLock<Option<AuthSession>>,
    sent: RwLock<HashMap<String, String>>,
}

impl MemoryLocalState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalState for MemoryLocalState {
    fn keys(&self) -> &dyn KeyStore {
        &self.keys
    }

    fn session(&self) -> Result<Option<AuthSession>> {
        Ok(self.session.read().clone())
    }

    fn set_session(&self, session: &AuthSession) -> Result<()> {
        *self.session.write() = Some(session.clone());
        Ok(())
    }

    fn remember_sent(&self, iv_hex: &str, plaintext: &str) -> Result<()> {
        self.sent
            .write()
            .insert(iv_key(iv_hex), plaintext.to_string());
        Ok(())
    }

    fn sent_plaintext(&self, iv_hex: &str) -> Result<Option<String>> {
        Ok(self.sent.read().get(&iv_key(iv_hex)).cloned())
    }

    fn reset(&self) -> Result<()> {
        self.keys.clear()?;
        *self.session.write() = None;
        self.sent.write().clear();
        Ok(())
    }
}

/// Sled-based local state
pub struct SledLocalState {
    db: sled::Db,
    keys: SledKeyStore,
    sent: sled::Tree,
    session: sled::Tree,
}

impl SledLocalState {
    /// Open or create local state at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Temporary state removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            keys: SledKeyStore::new(db.open_tree("keys")?),
            sent: db.open_tree("sent")?,
            session: db.open_tree("session")?,
            db,
        })
    }
}

impl LocalState for SledLocalState {
    fn keys(&self) -> &dyn KeyStore {
        &self.keys
    }

    fn session(&self) -> Result<Option<AuthSession>> {
        match self.session.get(SESSION_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_session(&self, session: &AuthSession) -> Result<()> {
        self.session
            .insert(SESSION_KEY, serde_json::to_vec(session)?)?;
        self.session.flush()?;
        Ok(())
    }

    fn remember_sent(&self, iv_hex: &str, plaintext: &str) -> Result<()> {
        self.sent
            .insert(iv_key(iv_hex).as_bytes(), plaintext.as_bytes())?;
        self.sent.flush()?;
        Ok(())
    }

    fn sent_plaintext(&self, iv_hex: &str) -> Result<Option<String>> {
        Ok(self
            .sent
            .get(iv_key(iv_hex).as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn reset(&self) -> Result<()> {
        self.keys.clear()?;
        self.sent.clear()?;
        self.session.clear()?;
        self.db.flush()?;
        info!("Local state reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherpost_core::UserId;
    use cipherpost_crypto::keys::PrivateKeyPem;

    fn states() -> Vec<(&'static str, Box<dyn LocalState>)> {
        vec![
            ("memory", Box::new(MemoryLocalState::new())),
            ("sled", Box::new(SledLocalState::temporary().unwrap())),
        ]
    }

    fn session() -> AuthSession {
        AuthSession {
            token: "tok".into(),
            user_id: UserId::new(1),
            username: "alice".into(),
            public_key: None,
        }
    }

    #[test]
    fn test_sent_cache_keyed_by_iv() {
        for (name, state) in states() {
            state.remember_sent("ABCDEF", "hello").unwrap();
            assert_eq!(
                state.sent_plaintext("abcdef").unwrap().as_deref(),
                Some("hello"),
                "{name}"
            );
            assert_eq!(state.sent_plaintext("012345").unwrap(), None, "{name}");
        }
    }

    #[test]
    fn test_reset_clears_everything() {
        for (name, state) in states() {
            state.set_session(&session()).unwrap();
            state.keys().put("alice", PrivateKeyPem::new("k")).unwrap();
            state.remember_sent("00", "hi").unwrap();

            state.reset().unwrap();

            assert_eq!(state.session().unwrap(), None, "{name}");
            assert_eq!(state.keys().get("alice").unwrap(), None, "{name}");
            assert_eq!(state.sent_plaintext("00").unwrap(), None, "{name}");
        }
    }

    #[test]
    fn test_sled_state_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let state = SledLocalState::open(dir.path()).unwrap();
            state.set_session(&session()).unwrap();
            state.keys().put("alice", PrivateKeyPem::new("k")).unwrap();
            state.remember_sent("aa", "kept").unwrap();
        }

        let state = SledLocalState::open(dir.path()).unwrap();
        assert_eq!(state.session().unwrap(), Some(session()));
        assert_eq!(state.keys().get("Alice").unwrap(), Some(PrivateKeyPem::new("k")));
        assert_eq!(state.sent_plaintext("AA").unwrap().as_deref(), Some("kept"));
    }
}
