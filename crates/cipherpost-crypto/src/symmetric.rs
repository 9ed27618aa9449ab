//! Symmetric message encryption
//!
//! AES-128 in CBC mode with PKCS#7 padding. There is no authentication tag:
//! a corrupted ciphertext either fails to unpad or decrypts to garbage.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;

use crate::error::{CryptoError, Result};
use crate::keys::{Iv, SessionKey};
use crate::BLOCK_SIZE;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Encrypt `plaintext` under `key` and `iv`.
///
/// Output length is always a non-zero multiple of [`BLOCK_SIZE`].
pub fn encrypt(plaintext: &[u8], key: &SessionKey, iv: &Iv) -> Vec<u8> {
    Aes128CbcEnc::new(key.as_bytes().into(), iv.as_bytes().into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt `ciphertext` under `key` and `iv`.
///
/// Malformed lengths and invalid padding are reported as
/// [`CryptoError::Decryption`].
pub fn decrypt(ciphertext: &[u8], key: &SessionKey, iv: &Iv) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Decryption(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    Aes128CbcDec::new(key.as_bytes().into(), iv.as_bytes().into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption("invalid padding".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_roundtrip() {
        let key = SessionKey::generate();
        let iv = Iv::generate();
        let plaintext = b"hello";

        let ciphertext = encrypt(plaintext, &key, &iv);
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert_eq!(decrypt(&ciphertext, &key, &iv).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_plaintext_is_one_block() {
        let key = SessionKey::generate();
        let iv = Iv::generate();

        let ciphertext = encrypt(b"", &key, &iv);
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert!(decrypt(&ciphertext, &key, &iv).unwrap().is_empty());
    }

    #[test]
    fn test_known_vector() {
        // NIST SP 800-38A F.2.1, first block, followed by one PKCS#7 padding block
        let key = SessionKey::from_bytes([
            0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf,
            0x4f, 0x3c,
        ]);
        let iv = Iv::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        let ciphertext = encrypt(&plaintext, &key, &iv);
        assert_eq!(
            hex::encode(&ciphertext[..BLOCK_SIZE]),
            "7649abac8119b246cee98e9b12e9197d"
        );
    }

    #[test]
    fn test_bad_lengths_rejected() {
        let key = SessionKey::generate();
        let iv = Iv::generate();

        assert!(matches!(decrypt(&[], &key, &iv), Err(CryptoError::Decryption(_))));
        assert!(matches!(
            decrypt(&[0u8; 15], &key, &iv),
            Err(CryptoError::Decryption(_))
        ));
        assert!(matches!(
            decrypt(&[0u8; 17], &key, &iv),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn test_wrong_key_never_yields_plaintext() {
        let key = SessionKey::generate();
        let other = SessionKey::generate();
        let iv = Iv::generate();
        let plaintext = b"meet me at noon";

        let ciphertext = encrypt(plaintext, &key, &iv);
        match decrypt(&ciphertext, &other, &iv) {
            Ok(out) => assert_ne!(out, plaintext),
            Err(e) => assert!(matches!(e, CryptoError::Decryption(_))),
        }
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
            key in any::<[u8; 16]>(),
            iv in any::<[u8; 16]>(),
        ) {
            let key = SessionKey::from_bytes(key);
            let iv = Iv::from_bytes(iv);
            let ciphertext = encrypt(&plaintext, &key, &iv);
            prop_assert_eq!(decrypt(&ciphertext, &key, &iv).unwrap(), plaintext);
        }

        #[test]
        fn prop_hex_digit_flip_never_returns_original(
            plaintext in proptest::collection::vec(any::<u8>(), 1..128),
            position in any::<prop::sample::Index>(),
        ) {
            let key = SessionKey::generate();
            let iv = Iv::generate();
            let mut hex_ct = hex::encode(encrypt(&plaintext, &key, &iv)).into_bytes();

            let idx = position.index(hex_ct.len());
            hex_ct[idx] = if hex_ct[idx] == b'0' { b'1' } else { b'0' };
            let tampered = hex::decode(&hex_ct).unwrap();

            match decrypt(&tampered, &key, &iv) {
                Ok(out) => prop_assert_ne!(out, plaintext),
                Err(e) => prop_assert!(matches!(e, CryptoError::Decryption(_))),
            }
        }

        #[test]
        fn prop_arbitrary_input_never_panics(
            ciphertext in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let key = SessionKey::generate();
            let iv = Iv::generate();
            let _ = decrypt(&ciphertext, &key, &iv);
        }
    }
}
