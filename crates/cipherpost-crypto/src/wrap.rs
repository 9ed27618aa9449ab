//! Session key wrapping with RSA-OAEP
//!
//! Wrap and unwrap share [`oaep_padding`], so the digest named by
//! [`OAEP_DIGEST`](crate::OAEP_DIGEST) is the only one ever used.

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::keys::{parse_public_key, SessionKey};

/// OAEP padding with SHA-256 for both the label hash and MGF1.
fn oaep_padding() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Encrypt a session key to `recipient`
pub fn wrap_key(key: &SessionKey, recipient: &RsaPublicKey) -> Result<Vec<u8>> {
    recipient
        .encrypt(&mut OsRng, oaep_padding(), key.as_bytes())
        .map_err(|e| CryptoError::Wrap(e.to_string()))
}

/// Encrypt a session key to a recipient given as PEM text.
///
/// A key that does not parse is a wrap failure.
pub fn wrap_key_pem(key: &SessionKey, recipient_pem: &str) -> Result<Vec<u8>> {
    let recipient = parse_public_key(recipient_pem).map_err(|e| CryptoError::Wrap(e.to_string()))?;
    wrap_key(key, &recipient)
}

/// Recover a session key with the owner's private key.
///
/// Fails with [`CryptoError::Unwrap`] when the private key does not match the
/// key the session key was wrapped under, or the padding is invalid.
pub fn unwrap_key(wrapped: &[u8], private: &RsaPrivateKey) -> Result<SessionKey> {
    let bytes = Zeroizing::new(
        private
            .decrypt(oaep_padding(), wrapped)
            .map_err(|e| CryptoError::Unwrap(e.to_string()))?,
    );
    SessionKey::from_slice(&bytes).map_err(|e| CryptoError::Unwrap(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys;
    use proptest::prelude::*;
    use rsa::Pkcs1v15Encrypt;
    use sha2::Sha512;

    #[test]
    fn test_wrap_unwrap() {
        let (alice, _) = test_keys::pair();
        let key = SessionKey::generate();

        let wrapped = wrap_key(&key, alice.public_key()).unwrap();
        assert_eq!(wrapped.len(), 256);

        let unwrapped = unwrap_key(&wrapped, alice.private_key()).unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrap_is_randomized() {
        let (alice, _) = test_keys::pair();
        let key = SessionKey::generate();

        let w1 = wrap_key(&key, alice.public_key()).unwrap();
        let w2 = wrap_key(&key, alice.public_key()).unwrap();
        assert_ne!(w1, w2);
    }

    #[test]
    fn test_cross_key_fails() {
        let (alice, bob) = test_keys::pair();
        let key = SessionKey::generate();

        let wrapped = wrap_key(&key, alice.public_key()).unwrap();
        assert!(matches!(
            unwrap_key(&wrapped, bob.private_key()),
            Err(CryptoError::Unwrap(_))
        ));
    }

    #[test]
    fn test_other_digest_rejected() {
        let (alice, _) = test_keys::pair();
        let key = SessionKey::generate();

        let wrapped = alice
            .public_key()
            .encrypt(&mut OsRng, Oaep::new::<Sha512>(), key.as_bytes())
            .unwrap();
        assert!(matches!(
            unwrap_key(&wrapped, alice.private_key()),
            Err(CryptoError::Unwrap(_))
        ));
    }

    #[test]
    fn test_wrong_length_payload_rejected() {
        let (alice, _) = test_keys::pair();
        let wrapped = alice
            .public_key()
            .encrypt(&mut OsRng, oaep_padding(), &[7u8; 32])
            .unwrap();
        assert!(matches!(
            unwrap_key(&wrapped, alice.private_key()),
            Err(CryptoError::Unwrap(_))
        ));

        let pkcs1 = alice
            .public_key()
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, &[7u8; 16])
            .unwrap();
        assert!(unwrap_key(&pkcs1, alice.private_key()).is_err());
    }

    #[test]
    fn test_garbage_input_rejected() {
        let (alice, _) = test_keys::pair();
        assert!(matches!(
            unwrap_key(&[], alice.private_key()),
            Err(CryptoError::Unwrap(_))
        ));
        assert!(matches!(
            unwrap_key(&[0xffu8; 300], alice.private_key()),
            Err(CryptoError::Unwrap(_))
        ));
    }

    #[test]
    fn test_unparseable_recipient_is_wrap_error() {
        let key = SessionKey::generate();
        assert!(matches!(
            wrap_key_pem(&key, "-----BEGIN PUBLIC KEY-----\n-----END PUBLIC KEY-----"),
            Err(CryptoError::Wrap(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_unwrap_inverts_wrap(bytes in any::<[u8; 16]>()) {
            let (alice, _) = test_keys::pair();
            let key = SessionKey::from_bytes(bytes);
            let wrapped = wrap_key(&key, alice.public_key()).unwrap();
            let unwrapped = unwrap_key(&wrapped, alice.private_key()).unwrap();
            prop_assert_eq!(unwrapped.as_bytes(), &bytes);
        }
    }
}
