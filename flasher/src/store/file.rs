//! File backed stores
//!
//! One JSON file per key. Compare-and-set is serialized by a process local
//! lock, so workers sharing a directory must share a process.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::worker::WorkerIdentity;
use crate::store::{is_expired, worker_key, KvEntry, LivenessRegistry, StatusKv, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct KvRecord {
    key: String,
    revision: u64,
    updated_at: DateTime<Utc>,
    value: String,
}

impl From<KvRecord> for KvEntry {
    fn from(record: KvRecord) -> Self {
        KvEntry {
            key: record.key,
            value: record.value.into_bytes(),
            revision: record.revision,
            updated_at: record.updated_at,
        }
    }
}

/// Status store in a directory
pub struct FileKv {
    dir: Dir,
    lock: Mutex<()>,
}

impl FileKv {
    pub fn new(dir: Dir) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    fn entry_file(&self, key: &str) -> File {
        self.dir.file(&format!("{}.json", key))
    }

    async fn read(&self, key: &str) -> Result<Option<KvRecord>, StoreError> {
        let file = self.entry_file(key);
        if !file.exists().await {
            return Ok(None);
        }

        let bytes = file.read_bytes().await.map_err(io)?;
        let record = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e)))?;
        Ok(Some(record))
    }

    async fn write(&self, key: &str, value: Vec<u8>, revision: u64) -> Result<(), StoreError> {
        let value = String::from_utf8(value)
            .map_err(|_| StoreError::Corrupt(format!("{}: value is not utf-8", key)))?;

        let record = KvRecord {
            key: key.to_string(),
            revision,
            updated_at: Utc::now(),
            value,
        };

        let bytes = serde_json::to_vec(&record)?;
        self.entry_file(key).write_atomic(&bytes).await.map_err(io)
    }
}

#[async_trait]
impl StatusKv for FileKv {
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;
        if self.read(key).await?.is_some() {
            return Err(StoreError::KeyExists(key.to_string()));
        }

        self.write(key, value, 1).await?;
        Ok(1)
    }

    async fn update(&self, key: &str, value: Vec<u8>, revision: u64) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;
        let current = self
            .read(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if current.revision != revision {
            return Err(StoreError::RevisionMismatch {
                key: key.to_string(),
                expected: revision,
                actual: current.revision,
            });
        }

        self.write(key, value, revision + 1).await?;
        Ok(revision + 1)
    }

    async fn get(&self, key: &str) -> Result<Option<KvEntry>, StoreError> {
        Ok(self.read(key).await?.map(KvEntry::from))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LivenessRecord {
    worker_id: String,
    name: String,
    facility_code: String,
    last_contact: DateTime<Utc>,
}

/// Liveness registry in a directory
pub struct FileLiveness {
    dir: Dir,
    ttl: Duration,
}

impl FileLiveness {
    pub fn new(dir: Dir, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    fn worker_file(&self, worker_id: &str) -> File {
        self.dir.file(&format!("{}.json", worker_id))
    }

    async fn write(&self, worker: &WorkerIdentity) -> Result<(), StoreError> {
        let record = LivenessRecord {
            worker_id: worker_key(worker),
            name: worker.name.clone(),
            facility_code: worker.facility_code.clone(),
            last_contact: Utc::now(),
        };

        self.worker_file(&record.worker_id)
            .write_json(&record)
            .await
            .map_err(io)
    }
}

#[async_trait]
impl LivenessRegistry for FileLiveness {
    async fn register(&self, worker: &WorkerIdentity) -> Result<(), StoreError> {
        self.write(worker).await
    }

    async fn checkin(&self, worker: &WorkerIdentity) -> Result<(), StoreError> {
        let key = worker_key(worker);
        if !self.worker_file(&key).exists().await {
            return Err(StoreError::NotFound(key));
        }
        self.write(worker).await
    }

    async fn last_contact(&self, worker_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let file = self.worker_file(worker_id);
        if !file.exists().await {
            return Ok(None);
        }

        let record: LivenessRecord = file
            .read_json()
            .await
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", worker_id, e)))?;

        if is_expired(record.last_contact, self.ttl) {
            return Ok(None);
        }
        Ok(Some(record.last_contact))
    }

    async fn deregister(&self, worker: &WorkerIdentity) -> Result<(), StoreError> {
        self.worker_file(&worker_key(worker))
            .delete()
            .await
            .map_err(io)
    }
}

fn io(err: crate::errors::FlasherError) -> StoreError {
    StoreError::Io(err.to_string())
}
