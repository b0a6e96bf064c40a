//! In-memory stores, used for tests and single process deployments

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::worker::WorkerIdentity;
use crate::store::{is_expired, worker_key, KvEntry, LivenessRegistry, StatusKv, StoreError};

#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, KvEntry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an entry regardless of its revision
    pub fn put(&self, key: &str, value: Vec<u8>) -> u64 {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let revision = entries.get(key).map(|e| e.revision + 1).unwrap_or(1);
        entries.insert(
            key.to_string(),
            KvEntry {
                key: key.to_string(),
                value,
                revision,
                updated_at: Utc::now(),
            },
        );
        revision
    }
}

#[async_trait]
impl StatusKv for MemoryKv {
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(key) {
            return Err(StoreError::KeyExists(key.to_string()));
        }

        entries.insert(
            key.to_string(),
            KvEntry {
                key: key.to_string(),
                value,
                revision: 1,
                updated_at: Utc::now(),
            },
        );
        Ok(1)
    }

    async fn update(&self, key: &str, value: Vec<u8>, revision: u64) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if entry.revision != revision {
            return Err(StoreError::RevisionMismatch {
                key: key.to_string(),
                expected: revision,
                actual: entry.revision,
            });
        }

        entry.value = value;
        entry.revision += 1;
        entry.updated_at = Utc::now();
        Ok(entry.revision)
    }

    async fn get(&self, key: &str) -> Result<Option<KvEntry>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }
}

pub struct MemoryLiveness {
    ttl: Duration,
    workers: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryLiveness {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Set a worker's last contact directly
    pub fn set_last_contact(&self, worker_id: &str, ts: DateTime<Utc>) {
        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(worker_id.to_string(), ts);
    }
}

#[async_trait]
impl LivenessRegistry for MemoryLiveness {
    async fn register(&self, worker: &WorkerIdentity) -> Result<(), StoreError> {
        self.set_last_contact(&worker_key(worker), Utc::now());
        Ok(())
    }

    async fn checkin(&self, worker: &WorkerIdentity) -> Result<(), StoreError> {
        let key = worker_key(worker);
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        match workers.get_mut(&key) {
            Some(ts) => {
                *ts = Utc::now();
                Ok(())
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    async fn last_contact(&self, worker_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        Ok(workers
            .get(worker_id)
            .copied()
            .filter(|ts| !is_expired(*ts, self.ttl)))
    }

    async fn deregister(&self, worker: &WorkerIdentity) -> Result<(), StoreError> {
        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&worker_key(worker));
        Ok(())
    }
}
