//! Client-local private key storage
//!
//! Keys are stored under the username they were generated for. Lookup is a
//! best-effort heuristic that tolerates case changes and truncated legacy
//! identities, applied in three tiers, first match wins:
//!
//! 1. exact match on the stored identity
//! 2. case-insensitive match
//! 3. prefix match in either direction (case-insensitive), first entry in
//!    iteration order
//!
//! Tier 3 can return the wrong key when several entries partially match.
//! That risk is accepted; callers must not try to second-guess the result.

use std::collections::BTreeMap;

use cipherpost_crypto::keys::PrivateKeyPem;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;

/// Which lookup tier produced a match
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupTier {
    /// Stored identity equals the query
    Exact,
    /// Equal ignoring case
    CaseInsensitive,
    /// One is a prefix of the other, ignoring case
    Prefix,
}

/// Resolve `query` against `entries` (in their iteration order) and report
/// which tier matched. Empty queries never match.
pub fn lookup_with_tier<'a, V>(
    entries: &'a [(String, V)],
    query: &str,
) -> Option<(LookupTier, &'a V)> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }

    if let Some((_, v)) = entries.iter().find(|(id, _)| id == query) {
        return Some((LookupTier::Exact, v));
    }

    let lowered = query.to_lowercase();
    if let Some((_, v)) = entries.iter().find(|(id, _)| id.to_lowercase() == lowered) {
        return Some((LookupTier::CaseInsensitive, v));
    }

    entries
        .iter()
        .find(|(id, _)| {
            let id = id.to_lowercase();
            !id.is_empty() && (lowered.starts_with(&id) || id.starts_with(&lowered))
        })
        .map(|(_, v)| (LookupTier::Prefix, v))
}

/// Resolve `query` against `entries` in their iteration order
pub fn lookup<'a, V>(entries: &'a [(String, V)], query: &str) -> Option<&'a V> {
    lookup_with_tier(entries, query).map(|(_, v)| v)
}

/// Persistent mapping from identity to private key
pub trait KeyStore: Send + Sync {
    /// Store (or replace) the private key for `identity`
    fn put(&self, identity: &str, key: PrivateKeyPem) -> Result<()>;

    /// All entries in the store's stable iteration order
    fn entries(&self) -> Result<Vec<(String, PrivateKeyPem)>>;

    /// Remove the entry stored under exactly `identity`
    fn remove(&self, identity: &str) -> Result<()>;

    /// Remove every entry
    fn clear(&self) -> Result<()>;

    /// Find the private key for `identity` using the three-tier policy
    fn get(&self, identity: &str) -> Result<Option<PrivateKeyPem>> {
        let entries = self.entries()?;
        Ok(match lookup_with_tier(&entries, identity) {
            Some((tier, key)) => {
                debug!(?tier, "Private key found");
                Some(key.clone())
            }
            None => None,
        })
    }
}

/// In-memory key store, iterating in lexicographic order of identity
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<BTreeMap<String, PrivateKeyPem>>,
}

impl MemoryKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn put(&self, identity: &str, key: PrivateKeyPem) -> Result<()> {
        self.keys.write().insert(identity.to_string(), key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, PrivateKeyPem)>> {
        Ok(self
            .keys
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn remove(&self, identity: &str) -> Result<()> {
        self.keys.write().remove(identity);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.keys.write().clear();
        Ok(())
    }
}

/// Key store backed by a sled tree; iteration follows key byte order
pub struct SledKeyStore {
    tree: sled::Tree,
}

impl SledKeyStore {
    /// Wrap an open tree
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }
}

impl KeyStore for SledKeyStore {
    fn put(&self, identity: &str, key: PrivateKeyPem) -> Result<()> {
        self.tree.insert(identity.as_bytes(), key.expose().as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, PrivateKeyPem)>> {
        let mut entries = Vec::new();
        for item in self.tree.iter() {
            let (k, v) = item?;
            entries.push((
                String::from_utf8_lossy(&k).into_owned(),
                PrivateKeyPem::new(String::from_utf8_lossy(&v).into_owned()),
            ));
        }
        Ok(entries)
    }

    fn remove(&self, identity: &str) -> Result<()> {
        self.tree.remove(identity.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        self.tree.flush()?;
        Ok(())
    }
}
