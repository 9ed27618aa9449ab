//! # Cipherpost Cryptographic Library
//!
//! Hybrid encryption primitives for two-party messaging. Every message is
//! encrypted under a fresh 128-bit session key with AES-CBC, and that session
//! key is wrapped for the recipient with RSA-OAEP.
//!
//! ## Core Components
//!
//! - [`keys`]: RSA key pairs, PEM import/export, session keys and IVs
//! - [`symmetric`]: AES-128-CBC with PKCS#7 padding
//! - [`wrap`]: RSA-OAEP session key wrapping with a pinned digest
//! - [`hybrid`]: seal/open helpers combining the above
//!
//! ## Limitations
//!
//! CBC mode carries no authentication tag. Corruption of a ciphertext is only
//! detected incidentally when unpadding fails; callers must not treat a
//! successful [`symmetric::decrypt`] as proof of integrity.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod hybrid;
pub mod keys;
pub mod symmetric;
pub mod wrap;

pub use error::{CryptoError, Result};

/// Session key size in bytes (AES-128)
pub const SESSION_KEY_SIZE: usize = 16;

/// IV size in bytes (one AES block)
pub const IV_SIZE: usize = 16;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// RSA modulus size for generated key pairs
pub const RSA_KEY_BITS: usize = 2048;

/// Digest used for both OAEP and MGF1 when wrapping session keys.
///
/// Both sides of a conversation must agree on this value; it is never left to
/// a library default.
pub const OAEP_DIGEST: &str = "SHA-256";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{CryptoError, Result};
    pub use crate::hybrid::{open, seal, SealedMessage};
    pub use crate::keys::{
        generate_key_pair_blocking_task, Iv, KeyPair, PrivateKeyPem, PublicKeyPem, SessionKey,
    };
    pub use crate::symmetric::{decrypt, encrypt};
    pub use crate::wrap::{unwrap_key, wrap_key};
}

#[cfg(test)]
pub(crate) mod test_keys {
    use std::sync::OnceLock;

    use crate::keys::KeyPair;

    /// Two distinct key pairs shared across the crate's tests; RSA key
    /// generation is too slow to repeat per test.
    pub(crate) fn pair() -> &'static (KeyPair, KeyPair) {
        static KEYS: OnceLock<(KeyPair, KeyPair)> = OnceLock::new();
        KEYS.get_or_init(|| {
            let a = KeyPair::generate().unwrap();
            let b = KeyPair::generate().unwrap();
            (a, b)
        })
    }
}
