//! Status publisher
//!
//! Writes the task snapshot under `{facility}.{task id}`. The first write
//! creates the key, later writes are compare-and-set against the revision
//! this publisher last wrote. A lost race is logged and dropped; the next
//! publish tries again against the same revision.

use std::sync::Arc;

use chrono::Utc;
use condition_types::{StatusValue, STATUS_VALUE_SCHEMA_VERSION};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::task::Task;
use crate::models::worker::WorkerIdentity;
use crate::store::{worker_key, StatusKv, StoreError};

/// Status store key of a task
pub fn status_key(facility_code: &str, task_id: Uuid) -> String {
    format!("{}.{}", facility_code, task_id)
}

pub struct StatusPublisher {
    kv: Arc<dyn StatusKv>,
    worker: WorkerIdentity,
    revision: Option<u64>,
}

impl StatusPublisher {
    pub fn new(kv: Arc<dyn StatusKv>, worker: WorkerIdentity) -> Self {
        Self {
            kv,
            worker,
            revision: None,
        }
    }

    /// Continue publishing over an existing entry, e.g. when taking over an
    /// orphaned task
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Revision of the last successful write
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// Build the status value for a task
    pub fn status_value(&self, task: &Task) -> Result<StatusValue, StoreError> {
        Ok(StatusValue {
            worker_id: worker_key(&self.worker),
            target: task.asset_id().to_string(),
            state: task.state,
            status: serde_json::to_value(task)?,
            trace_id: task.trace_id.clone().unwrap_or_default(),
            span_id: task.span_id.clone().unwrap_or_default(),
            updated_at: Utc::now(),
            msg_version: STATUS_VALUE_SCHEMA_VERSION.to_string(),
        })
    }

    /// Publish the task status.
    ///
    /// Never fails the caller; store errors are logged.
    pub async fn publish(&mut self, task: &Task) {
        if let Err(e) = self.try_publish(task).await {
            if e.is_conflict() {
                warn!(
                    task_id = %task.id,
                    revision = ?self.revision,
                    "Status update dropped, entry was modified elsewhere: {}", e
                );
            } else {
                error!(task_id = %task.id, "Failed to publish status: {}", e);
            }
        }
    }

    /// Publish the task status, returning store errors
    pub async fn try_publish(&mut self, task: &Task) -> Result<u64, StoreError> {
        let key = status_key(&self.worker.facility_code, task.id);
        let value = serde_json::to_vec(&self.status_value(task)?)?;

        let revision = match self.revision {
            None => self.kv.create(&key, value).await?,
            Some(rev) => self.kv.update(&key, value, rev).await?,
        };

        debug!(key = %key, revision, state = %task.state, "Published status");
        self.revision = Some(revision);
        Ok(revision)
    }
}
