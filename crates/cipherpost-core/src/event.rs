//! Realtime channel events
//!
//! Carried as JSON text frames, tagged by `"type"`.

use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, StoredEnvelope};
use crate::error::Result;
use crate::identity::PresenceStatus;
use crate::types::UserId;

/// Client to server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind this connection to an identity and mark it online
    Join {
        /// Identity joining
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// Submit an envelope for persistence and redistribution
    Send {
        /// Envelope to relay
        envelope: Envelope,
    },
}

/// Server to client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A persisted envelope
    Receive {
        /// The envelope with its id
        envelope: StoredEnvelope,
    },
    /// An identity came online or went offline
    PresenceChanged {
        /// Identity whose status changed
        id: UserId,
        /// New status
        status: PresenceStatus,
    },
}

impl ClientEvent {
    /// Parse from a JSON text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Into::into)
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

impl ServerEvent {
    /// Parse from a JSON text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Into::into)
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}
