//! Hybrid encryption of a single message
//!
//! A fresh session key and IV are generated per call to [`seal`]; the session
//! key is wrapped for the recipient and dropped (zeroized) before returning.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{CryptoError, Result};
use crate::keys::{parse_private_key, Iv, SessionKey};
use crate::symmetric;
use crate::wrap::{unwrap_key, wrap_key_pem};

/// Output of [`seal`]: everything a recipient needs, hex-encoded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
    /// AES-CBC ciphertext
    pub ciphertext_hex: String,
    /// 16-byte IV
    pub iv_hex: String,
    /// Session key wrapped under the recipient's public key
    pub wrapped_key_hex: String,
}

/// Encrypt `plaintext` for the holder of `recipient_public_pem`
pub fn seal(plaintext: &str, recipient_public_pem: &str) -> Result<SealedMessage> {
    let key = SessionKey::generate();
    let iv = Iv::generate();

    let ciphertext = symmetric::encrypt(plaintext.as_bytes(), &key, &iv);
    let wrapped = wrap_key_pem(&key, recipient_public_pem)?;
    trace!(ciphertext_len = ciphertext.len(), "Sealed message");

    Ok(SealedMessage {
        ciphertext_hex: hex::encode(ciphertext),
        iv_hex: iv.to_hex(),
        wrapped_key_hex: hex::encode(wrapped),
    })
}

/// Recover the plaintext of a [`SealedMessage`] with the recipient's private key
pub fn open(sealed: &SealedMessage, private_pem: &str) -> Result<String> {
    let private = parse_private_key(private_pem)?;

    let wrapped = hex::decode(&sealed.wrapped_key_hex)?;
    let key = unwrap_key(&wrapped, &private)?;

    let iv = Iv::from_hex(&sealed.iv_hex)?;
    let ciphertext = hex::decode(&sealed.ciphertext_hex)
        .map_err(|e| CryptoError::Decryption(format!("ciphertext is not hex: {e}")))?;
    let plaintext = symmetric::decrypt(&ciphertext, &key, &iv)?;

    String::from_utf8(plaintext).map_err(|e| CryptoError::Encoding(e.to_string()))
}
