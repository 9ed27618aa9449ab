//! Durable relay storage for identities and envelopes
//!
//! Usernames are unique case-insensitively. Envelopes reference identities
//! by id and cannot be appended for an identity that does not exist.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use cipherpost_core::{
    Envelope, EnvelopeId, IdentitySummary, PresenceStatus, StoredEnvelope, Timestamp, UserId,
};
use cipherpost_crypto::keys::PublicKeyPem;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::{debug, info};

use crate::error::{AuthError, RelayError, Result};

/// One row of the identities table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Server-assigned id
    pub id: UserId,
    /// Username, case preserved
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Current public key
    pub public_key: PublicKeyPem,
    /// Presence
    pub status: PresenceStatus,
    /// Last presence change
    pub last_seen: Timestamp,
}

impl IdentityRecord {
    /// Public view for directory listings
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            id: self.id,
            username: self.username.clone(),
            public_key: self.public_key.clone(),
            status: self.status,
        }
    }
}

/// Fields supplied when creating an identity
#[derive(Clone, Debug)]
pub struct NewIdentity {
    /// Requested username
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Registered public key
    pub public_key: PublicKeyPem,
    /// Initial presence
    pub status: PresenceStatus,
}

/// Storage statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Registered identities
    pub identity_count: usize,
    /// Persisted envelopes
    pub envelope_count: usize,
}

/// Relay storage trait
///
/// Writers serialize through the backend's own concurrency control.
pub trait RelayStorage: Send + Sync {
    /// Create an identity; fails with `DuplicateUsername` if the name is taken
    fn create_identity(&self, new: NewIdentity) -> Result<IdentityRecord>;

    /// Look up an identity by id
    fn identity(&self, id: UserId) -> Result<Option<IdentityRecord>>;

    /// Look up an identity by username, ignoring case
    fn identity_by_username(&self, username: &str) -> Result<Option<IdentityRecord>>;

    /// All identities, ordered by id
    fn identities(&self) -> Result<Vec<IdentityRecord>>;

    /// Replace an identity's public key
    fn set_public_key(&self, id: UserId, public_key: PublicKeyPem) -> Result<()>;

    /// Update presence and last-seen
    fn set_status(&self, id: UserId, status: PresenceStatus, last_seen: Timestamp) -> Result<()>;

    /// Durably append an envelope, assigning its id
    fn append_envelope(&self, envelope: &Envelope) -> Result<StoredEnvelope>;

    /// Envelopes exchanged between `a` and `b` in either direction, ascending
    /// by timestamp with ties broken by id
    fn envelopes_between(&self, a: UserId, b: UserId) -> Result<Vec<StoredEnvelope>>;

    /// Row counts
    fn stats(&self) -> Result<StorageStats>;

    /// Delete every identity and envelope
    fn purge(&self) -> Result<()>;

    /// Flush pending writes
    fn flush(&self) -> Result<()>;
}

fn username_key(username: &str) -> String {
    username.to_lowercase()
}

fn sort_history(history: &mut [StoredEnvelope]) {
    history.sort_by_key(|s| (s.envelope.timestamp, s.id));
}

#[derive(Default)]
struct Tables {
    identities: BTreeMap<UserId, IdentityRecord>,
    usernames: HashMap<String, UserId>,
    envelopes: BTreeMap<EnvelopeId, Envelope>,
    last_identity: u64,
    last_envelope: u64,
}

/// In-memory relay storage (for testing)
#[derive(Default)]
pub struct MemoryRelayStorage {
    tables: RwLock<Tables>,
}

impl MemoryRelayStorage {
    /// Create new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelayStorage for MemoryRelayStorage {
    fn create_identity(&self, new: NewIdentity) -> Result<IdentityRecord> {
        let mut tables = self.tables.write();
        let key = username_key(&new.username);
        if tables.usernames.contains_key(&key) {
            return Err(AuthError::DuplicateUsername(new.username).into());
        }

        tables.last_identity += 1;
        let record = IdentityRecord {
            id: UserId::new(tables.last_identity),
            username: new.username,
            password_hash: new.password_hash,
            public_key: new.public_key,
            status: new.status,
            last_seen: Timestamp::now(),
        };
        tables.usernames.insert(key, record.id);
        tables.identities.insert(record.id, record.clone());

        debug!(id = %record.id, "Created identity");
        Ok(record)
    }

    fn identity(&self, id: UserId) -> Result<Option<IdentityRecord>> {
        Ok(self.tables.read().identities.get(&id).cloned())
    }

    fn identity_by_username(&self, username: &str) -> Result<Option<IdentityRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .usernames
            .get(&username_key(username))
            .and_then(|id| tables.identities.get(id))
            .cloned())
    }

    fn identities(&self) -> Result<Vec<IdentityRecord>> {
        Ok(self.tables.read().identities.values().cloned().collect())
    }

    fn set_public_key(&self, id: UserId, public_key: PublicKeyPem) -> Result<()> {
        let mut tables = self.tables.write();
        let record = tables
            .identities
            .get_mut(&id)
            .ok_or_else(|| RelayError::UnknownIdentity(id.to_string()))?;
        record.public_key = public_key;
        Ok(())
    }

    fn set_status(&self, id: UserId, status: PresenceStatus, last_seen: Timestamp) -> Result<()> {
        let mut tables = self.tables.write();
        let record = tables
            .identities
            .get_mut(&id)
            .ok_or_else(|| RelayError::UnknownIdentity(id.to_string()))?;
        record.status = status;
        record.last_seen = last_seen;
        Ok(())
    }

    fn append_envelope(&self, envelope: &Envelope) -> Result<StoredEnvelope> {
        let mut tables = self.tables.write();
        for id in [envelope.sender_id, envelope.receiver_id] {
            if !tables.identities.contains_key(&id) {
                return Err(RelayError::UnknownIdentity(id.to_string()));
            }
        }

        tables.last_envelope += 1;
        let id = EnvelopeId::new(tables.last_envelope);
        tables.envelopes.insert(id, envelope.clone());
        Ok(StoredEnvelope {
            id,
            envelope: envelope.clone(),
        })
    }

    fn envelopes_between(&self, a: UserId, b: UserId) -> Result<Vec<StoredEnvelope>> {
        let mut history: Vec<StoredEnvelope> = self
            .tables
            .read()
            .envelopes
            .iter()
            .filter(|(_, e)| e.involves(a, b))
            .map(|(id, e)| StoredEnvelope {
                id: *id,
                envelope: e.clone(),
            })
            .collect();
        sort_history(&mut history);
        Ok(history)
    }

    fn stats(&self) -> Result<StorageStats> {
        let tables = self.tables.read();
        Ok(StorageStats {
            identity_count: tables.identities.len(),
            envelope_count: tables.envelopes.len(),
        })
    }

    fn purge(&self) -> Result<()> {
        *self.tables.write() = Tables::default();
        info!("Purged relay storage");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Sled-based persistent storage
pub struct SledRelayStorage {
    db: sled::Db,
    identities: sled::Tree,
    usernames: sled::Tree,
    envelopes: sled::Tree,
}

impl SledRelayStorage {
    /// Open or create storage at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Temporary storage removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            identities: db.open_tree("identities")?,
            usernames: db.open_tree("usernames")?,
            envelopes: db.open_tree("envelopes")?,
            db,
        })
    }

    // sled ids start at zero; zero is reserved as invalid on the wire
    fn next_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    fn decode_identity(bytes: &[u8]) -> Result<IdentityRecord> {
        bincode::deserialize(bytes).map_err(Into::into)
    }

    // Compare-and-swap loop so concurrent presence and key updates never
    // overwrite each other with a stale record
    fn update_identity(&self, id: UserId, f: impl Fn(&mut IdentityRecord)) -> Result<()> {
        let key = id.to_be_bytes();
        loop {
            let current = self
                .identities
                .get(key)?
                .ok_or_else(|| RelayError::UnknownIdentity(id.to_string()))?;
            let mut record = Self::decode_identity(&current)?;
            f(&mut record);
            let updated = bincode::serialize(&record)?;

            if self
                .identities
                .compare_and_swap(key, Some(current), Some(updated))?
                .is_ok()
            {
                break;
            }
            debug!(%id, "Identity changed concurrently, retrying update");
        }
        self.identities.flush()?;
        Ok(())
    }
}

impl RelayStorage for SledRelayStorage {
    fn create_identity(&self, new: NewIdentity) -> Result<IdentityRecord> {
        let id = UserId::new(self.next_id()?);
        let key = username_key(&new.username);

        let record = IdentityRecord {
            id,
            username: new.username,
            password_hash: new.password_hash,
            public_key: new.public_key,
            status: new.status,
            last_seen: Timestamp::now(),
        };
        let row = bincode::serialize(&record)?;

        // The username claim and the identity row commit together
        let committed = (&self.usernames, &self.identities).transaction(|(usernames, identities)| {
            if usernames.get(key.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(()));
            }
            usernames.insert(key.as_bytes(), &id.to_be_bytes()[..])?;
            identities.insert(&id.to_be_bytes()[..], row.as_slice())?;
            Ok(())
        });
        match committed {
            Ok(()) => {}
            Err(TransactionError::Abort(())) => {
                return Err(AuthError::DuplicateUsername(record.username).into());
            }
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        }
        self.db.flush()?;

        debug!(id = %record.id, "Created identity");
        Ok(record)
    }

    fn identity(&self, id: UserId) -> Result<Option<IdentityRecord>> {
        match self.identities.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_identity(&bytes)?)),
            None => Ok(None),
        }
    }

    fn identity_by_username(&self, username: &str) -> Result<Option<IdentityRecord>> {
        let Some(id_bytes) = self.usernames.get(username_key(username).as_bytes())? else {
            return Ok(None);
        };
        let id: [u8; 8] = id_bytes
            .as_ref()
            .try_into()
            .map_err(|_| RelayError::Storage("corrupt username index".into()))?;
        self.identity(UserId::new(u64::from_be_bytes(id)))
    }

    fn identities(&self) -> Result<Vec<IdentityRecord>> {
        self.identities
            .iter()
            .values()
            .map(|v| Self::decode_identity(&v?))
            .collect()
    }

    fn set_public_key(&self, id: UserId, public_key: PublicKeyPem) -> Result<()> {
        self.update_identity(id, |r| r.public_key = public_key.clone())
    }

    fn set_status(&self, id: UserId, status: PresenceStatus, last_seen: Timestamp) -> Result<()> {
        self.update_identity(id, |r| {
            r.status = status;
            r.last_seen = last_seen;
        })
    }

    fn append_envelope(&self, envelope: &Envelope) -> Result<StoredEnvelope> {
        for user in [envelope.sender_id, envelope.receiver_id] {
            if !self.identities.contains_key(user.to_be_bytes())? {
                return Err(RelayError::UnknownIdentity(user.to_string()));
            }
        }

        let id = EnvelopeId::new(self.next_id()?);
        self.envelopes
            .insert(id.to_be_bytes(), bincode::serialize(envelope)?)?;
        self.envelopes.flush()?;

        Ok(StoredEnvelope {
            id,
            envelope: envelope.clone(),
        })
    }

    fn envelopes_between(&self, a: UserId, b: UserId) -> Result<Vec<StoredEnvelope>> {
        let mut history = Vec::new();
        for entry in self.envelopes.iter() {
            let (key, value) = entry?;
            let envelope: Envelope = bincode::deserialize(&value)?;
            if !envelope.involves(a, b) {
                continue;
            }
            let id: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| RelayError::Storage("corrupt envelope key".into()))?;
            history.push(StoredEnvelope {
                id: EnvelopeId::new(u64::from_be_bytes(id)),
                envelope,
            });
        }
        sort_history(&mut history);
        Ok(history)
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            identity_count: self.identities.len(),
            envelope_count: self.envelopes.len(),
        })
    }

    fn purge(&self) -> Result<()> {
        self.envelopes.clear()?;
        self.usernames.clear()?;
        self.identities.clear()?;
        self.flush()?;
        info!("Purged relay storage");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
