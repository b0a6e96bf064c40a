//! Status and liveness stores
//!
//! The status store is a key/value store with per-key revisions, used for
//! optimistic concurrency. The liveness registry records when each worker
//! last checked in; an entry older than the registry's TTL counts as gone.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::worker::WorkerIdentity;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("revision mismatch for {key}: expected {expected}, found {actual}")]
    RevisionMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Io(String),

    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt entry {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True for the errors a compare-and-set write loses on
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::KeyExists(_) | StoreError::RevisionMismatch { .. }
        )
    }
}

/// A stored value and its revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// Key/value store with compare-and-set updates
#[async_trait]
pub trait StatusKv: Send + Sync {
    /// Create `key`, fails with [`StoreError::KeyExists`] if it is present.
    /// Returns the new revision.
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<u64, StoreError>;

    /// Replace `key` if its current revision is `revision`. Returns the new
    /// revision.
    async fn update(&self, key: &str, value: Vec<u8>, revision: u64) -> Result<u64, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<KvEntry>, StoreError>;
}

/// Registry of live workers
#[async_trait]
pub trait LivenessRegistry: Send + Sync {
    async fn register(&self, worker: &WorkerIdentity) -> Result<(), StoreError>;

    /// Refresh the worker's last contact, [`StoreError::NotFound`] if the
    /// worker is not registered
    async fn checkin(&self, worker: &WorkerIdentity) -> Result<(), StoreError>;

    /// Last contact of a worker, `None` when unknown or expired
    async fn last_contact(&self, worker_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn deregister(&self, worker: &WorkerIdentity) -> Result<(), StoreError>;
}

/// Worker key used by the liveness registry
pub fn worker_key(worker: &WorkerIdentity) -> String {
    worker.id.to_string()
}

pub(crate) fn is_expired(last_contact: DateTime<Utc>, ttl: std::time::Duration) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => Utc::now() - last_contact > ttl,
        Err(_) => false,
    }
}
