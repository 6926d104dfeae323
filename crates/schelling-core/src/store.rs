//! Durable storage of pending commitments, keyed by (round, participant).
//!
//! The salt only exists locally until reveal, so a commitment must survive a
//! full process restart between the commit and reveal phases.

use crate::crypto::{CommitDigest, Salt};
use crate::protocol::{Address, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors from commitment storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt commitment record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Failed to encode commitment record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A participant's secret for one round
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    pub round_id: RoundId,
    pub participant: Address,
    pub answer: String,
    pub salt: Salt,
}

impl Commitment {
    /// Digest this record commits to
    pub fn digest(&self) -> CommitDigest {
        CommitDigest::compute(&self.answer, &self.salt)
    }
}

/// Persisted layout of one record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct StoredRecord {
    answer: String,
    salt: Salt,
}

/// Composite storage key; distinct for every (round, participant) pair
pub fn storage_key(round_id: RoundId, participant: &Address) -> String {
    format!("schelling-{}-{}", round_id, participant)
}

/// Key-value persistence of pending commitments.
///
/// `save` overwrites any existing record for the key. `load` returns
/// `Ok(None)` for a key that was never saved.
pub trait CommitmentStore: Send + Sync {
    fn save(
        &self,
        round_id: RoundId,
        participant: &Address,
        answer: &str,
        salt: &Salt,
    ) -> Result<(), StoreError>;

    fn load(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<Option<Commitment>, StoreError>;
}

/// In-memory store for tests and demo mode
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommitmentStore for MemoryStore {
    fn save(
        &self,
        round_id: RoundId,
        participant: &Address,
        answer: &str,
        salt: &Salt,
    ) -> Result<(), StoreError> {
        let key = storage_key(round_id, participant);
        let record = StoredRecord {
            answer: answer.to_string(),
            salt: salt.clone(),
        };
        let previous = self.records.lock().unwrap().insert(key.clone(), record.clone());
        warn_on_replace(&key, previous.as_ref(), &record);
        Ok(())
    }

    fn load(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<Option<Commitment>, StoreError> {
        let key = storage_key(round_id, participant);
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&key)
            .map(|record| to_commitment(round_id, participant, record.clone())))
    }
}

/// One JSON file per key inside a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the storage directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read_record(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

impl CommitmentStore for FileStore {
    fn save(
        &self,
        round_id: RoundId,
        participant: &Address,
        answer: &str,
        salt: &Salt,
    ) -> Result<(), StoreError> {
        let key = storage_key(round_id, participant);
        let record = StoredRecord {
            answer: answer.to_string(),
            salt: salt.clone(),
        };
        // An unreadable previous record is replaced without comparison
        let previous = self.read_record(&key).ok().flatten();
        let json = serde_json::to_vec_pretty(&record)?;

        // Write to a temp file and rename so a crash never leaves half a record
        let tmp = self.dir.join(format!(".{}.{}.tmp", key, Uuid::new_v4()));
        if let Err(e) = write_then_rename(&tmp, &self.path_for(&key), &json) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(%key, "saved commitment");
        warn_on_replace(&key, previous.as_ref(), &record);
        Ok(())
    }

    fn load(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<Option<Commitment>, StoreError> {
        let key = storage_key(round_id, participant);
        Ok(self
            .read_record(&key)?
            .map(|record| to_commitment(round_id, participant, record)))
    }
}

fn write_then_rename(tmp: &Path, dest: &Path, bytes: &[u8]) -> io::Result<()> {
    {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(tmp, dest)
}

fn to_commitment(round_id: RoundId, participant: &Address, record: StoredRecord) -> Commitment {
    Commitment {
        round_id,
        participant: *participant,
        answer: record.answer,
        salt: record.salt,
    }
}

fn warn_on_replace(key: &str, previous: Option<&StoredRecord>, current: &StoredRecord) {
    if let Some(previous) = previous {
        if previous != current {
            warn!(%key, "replaced a different saved commitment");
        }
    }
}
