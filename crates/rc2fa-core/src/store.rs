//! Tracking store
//!
//! Durable username -> [`UserTrackingRecord`] mapping with an explicit commit
//! boundary:
//! - [`TrackingRepository`] loads and persists whole snapshots
//! - [`TrackingSession`] is the scoped handle a cycle mutates
//! - Nothing reaches the backend until [`TrackingSession::commit`]

use crate::error::StoreError;
use crate::types::UserTrackingRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Snapshot format version written by this build
pub const STORE_FORMAT_VERSION: u32 = 1;

/// All tracked records, keyed by username
pub type TrackingRecords = BTreeMap<String, UserTrackingRecord>;

/// Backend holding the durable snapshot
pub trait TrackingRepository: Send + Sync + Debug {
    /// Read the last committed snapshot
    fn load(&self) -> Result<TrackingRecords, StoreError>;

    /// Replace the durable snapshot atomically
    fn persist(&self, records: &TrackingRecords) -> Result<(), StoreError>;
}

/// On-disk layout of the JSON store
#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    version: u32,
    users: TrackingRecords,
}

/// JSON file backend
///
/// A missing file is an empty store. Commits go through a temporary file in
/// the same directory followed by a rename, so readers only ever see a
/// complete snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    /// Create backend for the given file
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store file path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl TrackingRepository for JsonFileRepository {
    fn load(&self) -> Result<TrackingRecords, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No store at {}, starting empty", self.path.display());
                return Ok(TrackingRecords::new());
            }
            Err(source) => {
                return Err(StoreError::Open {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let snapshot: StoreSnapshot =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        if snapshot.version != STORE_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: snapshot.version,
                expected: STORE_FORMAT_VERSION,
            });
        }

        Ok(snapshot.users)
    }

    fn persist(&self, records: &TrackingRecords) -> Result<(), StoreError> {
        let commit_err = |source: std::io::Error| StoreError::Commit {
            path: self.path.clone(),
            source,
        };

        let snapshot = StoreSnapshot {
            version: STORE_FORMAT_VERSION,
            users: records.clone(),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(self.parent_dir()).map_err(commit_err)?;
        serde_json::to_writer_pretty(&mut tmp, &snapshot)?;
        tmp.as_file().sync_all().map_err(commit_err)?;
        tmp.persist(&self.path).map_err(|e| commit_err(e.error))?;

        tracing::debug!(
            "Committed {} tracking records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// In-memory backend
///
/// Keeps the committed snapshot for the lifetime of the value. Used for
/// dry runs against scratch state and in tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Mutex<TrackingRecords>,
    commits: Mutex<usize>,
}

impl MemoryRepository {
    /// Create empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create backend pre-populated with records
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = UserTrackingRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.username.clone(), r))
            .collect();
        Self {
            records: Mutex::new(records),
            commits: Mutex::new(0),
        }
    }

    /// Copy of the committed snapshot
    #[must_use]
    pub fn snapshot(&self) -> TrackingRecords {
        self.records.lock().clone()
    }

    /// Number of successful commits
    #[must_use]
    pub fn commit_count(&self) -> usize {
        *self.commits.lock()
    }
}

impl TrackingRepository for MemoryRepository {
    fn load(&self) -> Result<TrackingRecords, StoreError> {
        Ok(self.records.lock().clone())
    }

    fn persist(&self, records: &TrackingRecords) -> Result<(), StoreError> {
        *self.records.lock() = records.clone();
        *self.commits.lock() += 1;
        Ok(())
    }
}

/// Scoped handle over one cycle's working copy
///
/// Mutations stay local until [`commit`](Self::commit). Dropping an
/// uncommitted session discards its changes.
#[derive(Debug)]
pub struct TrackingSession<'a> {
    repository: &'a dyn TrackingRepository,
    records: TrackingRecords,
    dirty: bool,
    committed: bool,
}

impl<'a> TrackingSession<'a> {
    /// Load the committed snapshot into a new session
    pub fn open(repository: &'a dyn TrackingRepository) -> Result<Self, StoreError> {
        let records = repository.load()?;
        tracing::debug!("Opened tracking store with {} records", records.len());
        Ok(Self {
            repository,
            records,
            dirty: false,
            committed: false,
        })
    }

    /// All tracked usernames
    #[must_use]
    pub fn keys(&self) -> BTreeSet<String> {
        self.records.keys().cloned().collect()
    }

    /// Record for a username
    #[inline]
    #[must_use]
    pub fn get(&self, username: &str) -> Option<&UserTrackingRecord> {
        self.records.get(username)
    }

    /// Existing record, or a new zero-count record stamped with `now`
    pub fn get_or_create(&mut self, username: &str, now: DateTime<Utc>) -> &mut UserTrackingRecord {
        self.dirty = true;
        self.records
            .entry(username.to_string())
            .or_insert_with(|| UserTrackingRecord::new(username, now))
    }

    /// Insert or replace a record
    pub fn put(&mut self, record: UserTrackingRecord) {
        self.dirty = true;
        self.records.insert(record.username.clone(), record);
    }

    /// Remove a record; absent usernames are ignored
    pub fn delete(&mut self, username: &str) -> Option<UserTrackingRecord> {
        let removed = self.records.remove(username);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Number of tracked records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Persist the working copy and release the session
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.repository.persist(&self.records)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TrackingSession<'_> {
    fn drop(&mut self) {
        if self.dirty && !self.committed {
            tracing::warn!("Discarding uncommitted tracking store changes");
        }
    }
}
