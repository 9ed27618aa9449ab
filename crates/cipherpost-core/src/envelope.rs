//! The envelope: one encrypted message as transmitted and stored
//!
//! The relay persists envelopes verbatim and never sees a session key or
//! private key. Shape validation is all it can check.

use cipherpost_crypto::hybrid::SealedMessage;
use cipherpost_crypto::{BLOCK_SIZE, IV_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{EnvelopeId, Timestamp, UserId};
use crate::MAX_MESSAGE_SIZE;

/// One encrypted message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Sending identity
    pub sender_id: UserId,
    /// Receiving identity
    pub receiver_id: UserId,
    /// AES-CBC ciphertext, hex
    pub ciphertext: String,
    /// 16-byte IV, hex
    pub iv: String,
    /// Session key wrapped under the receiver's public key, hex
    pub wrapped_key: String,
    /// Sender's clock at send time
    pub timestamp: Timestamp,
}

impl Envelope {
    /// Assemble an envelope from a sealed message
    pub fn from_sealed(
        sender_id: UserId,
        receiver_id: UserId,
        sealed: SealedMessage,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sender_id,
            receiver_id,
            ciphertext: sealed.ciphertext_hex,
            iv: sealed.iv_hex,
            wrapped_key: sealed.wrapped_key_hex,
            timestamp,
        }
    }

    /// The cryptographic payload, for opening
    pub fn sealed(&self) -> SealedMessage {
        SealedMessage {
            ciphertext_hex: self.ciphertext.clone(),
            iv_hex: self.iv.clone(),
            wrapped_key_hex: self.wrapped_key.clone(),
        }
    }

    /// Whether this envelope belongs to the conversation between `a` and `b`
    pub fn involves(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    /// Check the envelope's shape without any key material
    pub fn validate(&self) -> Result<()> {
        if self.sender_id.get() == 0 || self.receiver_id.get() == 0 {
            return Err(CoreError::InvalidEnvelope(
                "sender and receiver ids must be non-zero".into(),
            ));
        }

        check_hex("iv", &self.iv)?;
        if self.iv.len() != IV_SIZE * 2 {
            return Err(CoreError::InvalidEnvelope(format!(
                "iv must be {} hex characters, got {}",
                IV_SIZE * 2,
                self.iv.len()
            )));
        }

        check_hex("ciphertext", &self.ciphertext)?;
        if self.ciphertext.len() % (BLOCK_SIZE * 2) != 0 {
            return Err(CoreError::InvalidEnvelope(
                "ciphertext is not a whole number of blocks".into(),
            ));
        }
        let size = self.ciphertext.len() / 2;
        if size > MAX_MESSAGE_SIZE {
            return Err(CoreError::MessageTooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }

        check_hex("wrappedKey", &self.wrapped_key)?;
        if self.wrapped_key.len() % 2 != 0 {
            return Err(CoreError::InvalidEnvelope(
                "wrappedKey has odd hex length".into(),
            ));
        }

        Ok(())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Into::into)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(Into::into)
    }
}

fn check_hex(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CoreError::InvalidEnvelope(format!("{field} is empty")));
    }
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidEnvelope(format!("{field} is not hex")));
    }
    Ok(())
}

/// A persisted envelope with its server-assigned id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEnvelope {
    /// Server-assigned id
    pub id: EnvelopeId,
    /// The envelope as submitted
    #[serde(flatten)]
    pub envelope: Envelope,
}
