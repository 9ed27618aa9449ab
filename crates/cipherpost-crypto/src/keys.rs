//! Key types for the Cipherpost protocol
//!
//! - Long-term RSA key pairs, exchanged as PEM text
//! - Per-message AES session keys (zeroized on drop, never serialized)
//! - Per-message initialization vectors

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, Result};
use crate::{IV_SIZE, RSA_KEY_BITS, SESSION_KEY_SIZE};

/// PEM-encoded RSA public key (SPKI, `BEGIN PUBLIC KEY`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKeyPem(String);

impl PublicKeyPem {
    /// Wrap PEM text without validating it; see [`PublicKeyPem::parse`]
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    /// The PEM text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the PEM into an RSA public key
    pub fn parse(&self) -> Result<RsaPublicKey> {
        parse_public_key(&self.0)
    }

    /// Consume into the PEM text
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PublicKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// PEM-encoded RSA private key (PKCS#8), zeroized on drop
#[derive(Clone)]
pub struct PrivateKeyPem(Zeroizing<String>);

impl PrivateKeyPem {
    /// Wrap PEM text without validating it
    pub fn new(pem: impl Into<String>) -> Self {
        Self(Zeroizing::new(pem.into()))
    }

    /// The PEM text
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Parse the PEM into an RSA private key
    pub fn parse(&self) -> Result<RsaPrivateKey> {
        parse_private_key(&self.0)
    }
}

impl fmt::Debug for PrivateKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyPem(<redacted>)")
    }
}

impl PartialEq for PrivateKeyPem {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

impl Eq for PrivateKeyPem {}

/// A 2048-bit RSA key pair
///
/// The private half never leaves the client that generated it.
#[derive(Clone)]
pub struct KeyPair {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl KeyPair {
    /// Generate a new key pair from the OS CSPRNG.
    ///
    /// CPU-bound; async callers should prefer
    /// [`generate_key_pair_blocking_task`].
    pub fn generate() -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGen(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        debug!(bits = RSA_KEY_BITS, "Generated RSA key pair");
        Ok(Self { public, private })
    }

    /// Rebuild a key pair from its private PEM
    pub fn from_private_pem(pem: &PrivateKeyPem) -> Result<Self> {
        let private = pem.parse()?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { public, private })
    }

    /// The public key
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// The private key
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Export the public key as SPKI PEM
    pub fn public_key_pem(&self) -> Result<PublicKeyPem> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map(PublicKeyPem)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Export the private key as PKCS#8 PEM
    pub fn private_key_pem(&self) -> Result<PrivateKeyPem> {
        let pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(PrivateKeyPem::new(pem.as_str()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Generate a key pair on the blocking thread pool.
pub async fn generate_key_pair_blocking_task() -> Result<KeyPair> {
    tokio::task::spawn_blocking(KeyPair::generate)
        .await
        .map_err(|e| CryptoError::KeyGen(format!("key generation task failed: {e}")))?
}

/// Parse an RSA public key from SPKI or PKCS#1 PEM
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Parse an RSA private key from PKCS#8 or PKCS#1 PEM
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Ephemeral AES-128 key for exactly one message
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Generate a fresh random session key
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly [`SESSION_KEY_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SESSION_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: SESSION_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// 128-bit CBC initialization vector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Iv(#[serde(with = "hex::serde")] [u8; IV_SIZE]);

impl Iv {
    /// Generate a fresh random IV
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from 32 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; IV_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidLength {
                expected: IV_SIZE,
                actual: bytes.len(),
            }
        })?;
        Ok(Self(arr))
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get IV bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}
