use crate::protocol::{decode_record, encode_record, ClientPackage, PayloadError};
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

/// Record kept for one open connection
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClientRecord {
    /// None until the connection reports its first update
    pub package: Option<ClientPackage>,
    /// Highest sequence number accepted so far (sequenced updates only)
    pub last_seq: Option<u64>,
}

/// Result of applying an inbound update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Sequence number not newer than the last accepted one
    Stale,
    /// Key not present (connection already closed)
    NotRegistered,
}

/// Record store errors
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Shutdown in progress; new writes are rejected
    StoreUnavailable,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::StoreUnavailable => write!(f, "record store unavailable (shutting down)"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Concurrent registry of the latest known state per connection.
///
/// Backed by a sharded `DashMap`: writers to the same key are serialized by
/// the shard lock and every read returns a whole record. Snapshots iterate
/// shard by shard, so records added or removed while a snapshot is taken may
/// or may not be included.
pub struct ClientRecordStore<K> {
    records: DashMap<K, ClientRecord>,
    sealed: AtomicBool,
}

impl<K> ClientRecordStore<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Register a pending record for a freshly opened connection
    pub fn open(&self, key: K) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.records.insert(key, ClientRecord::default());
        Ok(())
    }

    /// Insert or replace the package stored under `key`
    pub fn upsert(&self, key: K, package: ClientPackage) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.records.entry(key).or_default().package = Some(package);
        Ok(())
    }

    /// Update the package of a connection that is still registered.
    ///
    /// Never inserts: an update racing with `remove` for the same key either
    /// lands before the removal or finds nothing, so a removed record is
    /// never brought back. With `seq` set, the update is only applied if it
    /// is newer than the last accepted sequence number.
    pub fn apply(
        &self,
        key: &K,
        package: ClientPackage,
        seq: Option<u64>,
    ) -> Result<UpdateOutcome, StoreError> {
        self.ensure_open()?;

        let mut record = match self.records.get_mut(key) {
            Some(record) => record,
            None => return Ok(UpdateOutcome::NotRegistered),
        };

        if let (Some(seq), Some(last)) = (seq, record.last_seq) {
            if seq <= last {
                return Ok(UpdateOutcome::Stale);
            }
        }

        record.package = Some(package);
        if seq.is_some() {
            record.last_seq = seq;
        }
        Ok(UpdateOutcome::Applied)
    }

    /// Drop the reported package but keep the connection registered.
    ///
    /// Returns the package that was cleared, if any.
    pub fn reset(&self, key: &K) -> Option<ClientPackage> {
        self.records
            .get_mut(key)
            .and_then(|mut record| record.package.take())
    }

    /// Delete the record; no-op if absent
    pub fn remove(&self, key: &K) -> Option<ClientRecord> {
        self.records.remove(key).map(|(_, record)| record)
    }

    pub fn get(&self, key: &K) -> Option<ClientRecord> {
        self.records.get(key).map(|r| *r)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.records.contains_key(key)
    }

    /// Reported records (pending connections are skipped)
    pub fn snapshot(&self) -> Vec<(K, ClientPackage)> {
        self.records
            .iter()
            .filter_map(|entry| entry.package.map(|package| (entry.key().clone(), package)))
            .collect()
    }

    /// Canonical bulk encoding, one `<identity>/<x>/<y>/<z>` line per record
    pub fn encode(snapshot: &[(K, ClientPackage)]) -> Vec<String> {
        snapshot
            .iter()
            .map(|(_, package)| encode_record(package))
            .collect()
    }

    /// Parse one line produced by `encode`
    pub fn decode(line: &str) -> Result<ClientPackage, PayloadError> {
        decode_record(line)
    }

    /// `snapshot` followed by `encode`
    pub fn encoded_snapshot(&self) -> Vec<String> {
        Self::encode(&self.snapshot())
    }

    /// Reject further writes; removals and reads keep working
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    /// Number of registered connections, pending ones included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_sealed() {
            return Err(StoreError::StoreUnavailable);
        }
        Ok(())
    }
}

impl<K> Default for ClientRecordStore<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
