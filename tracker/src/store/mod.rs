//! # Record Store
//!
//! Durable persistence for roster documents, one blob per user. The
//! sync service only ever needs two operations, get and upsert by key,
//! so that is the whole [`RecordStore`] trait. The production backend
//! is sled, chosen for the same reasons it works everywhere else:
//! embedded, crash-safe, and thread-safe without external locking.
//!
//! ## Tree Layout
//!
//! | Tree      | Key                  | Value                    |
//! |-----------|----------------------|--------------------------|
//! | `rosters` | user id (16B UUID)   | encoded roster payload   |
//!
//! The value is the output of [`crate::roster::codec::encode`]; this
//! module never inspects it. Upserts replace the value wholesale, which
//! is exactly the last-write-wins policy the sync service promises.

use std::path::Path;

use sled::{Db, Tree};

use crate::auth::UserId;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("record not found for user {0}")]
    NotFound(UserId),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Opaque get/upsert-by-key persistence collaborator.
///
/// Conflict policy is the backend's own write discipline; this trait
/// imposes no additional locking and callers accept last-write-wins
/// races between concurrent upserts to the same key.
pub trait RecordStore: Send + Sync {
    /// Fetches the stored blob for a user, or `None` if the user has
    /// never synced.
    fn get(&self, user_id: &UserId) -> StoreResult<Option<Vec<u8>>>;

    /// Inserts or wholesale-replaces the stored blob for a user.
    fn upsert(&self, user_id: &UserId, payload: &[u8]) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// SledRecordStore
// ---------------------------------------------------------------------------

/// sled-backed [`RecordStore`].
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serialized writes,
/// so a `SledRecordStore` can be shared across request handlers via
/// `Arc` (or cloned; the handles are cheap) with no extra locking.
#[derive(Debug, Clone)]
pub struct SledRecordStore {
    /// The underlying sled database handle.
    db: Db,
    /// Roster blobs keyed by raw user UUID bytes.
    rosters: Tree,
}

impl SledRecordStore {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary store that lives in memory and is cleaned up
    /// when dropped. Ideal for unit tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let rosters = db.open_tree("rosters")?;
        Ok(Self { db, rosters })
    }

    /// Number of users with a stored roster.
    pub fn record_count(&self) -> usize {
        self.rosters.len()
    }

    /// Block until all pending writes are durable on disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl RecordStore for SledRecordStore {
    fn get(&self, user_id: &UserId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.rosters.get(user_id.as_bytes())?.map(|v| v.to_vec()))
    }

    fn upsert(&self, user_id: &UserId, payload: &[u8]) -> StoreResult<()> {
        self.rosters.insert(user_id.as_bytes(), payload)?;
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
