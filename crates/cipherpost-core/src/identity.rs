//! Directory entries and authenticated sessions

use cipherpost_crypto::keys::PublicKeyPem;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::UserId;

/// Online presence of an identity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceStatus {
    /// At least one realtime connection has joined as this identity
    Online,
    /// Not connected
    #[default]
    Offline,
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Public view of a registered identity, as listed by the directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    /// Server-assigned id
    pub id: UserId,
    /// Username, case preserved
    pub username: String,
    /// Current public key
    pub public_key: PublicKeyPem,
    /// Presence
    pub status: PresenceStatus,
}

/// Result of a successful register or login
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    /// Bearer token for directory and history requests
    pub token: String,
    /// The authenticated identity
    pub user_id: UserId,
    /// Username as stored by the server
    pub username: String,
    /// Current public key; only returned by login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKeyPem>,
}

/// Username comparison used everywhere identities are matched by name
pub fn usernames_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
