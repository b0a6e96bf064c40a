//! Orphan detection
//!
//! Classifies a task id by its status entry and the liveness of the worker
//! that last wrote it, so a restarted worker can tell fresh tasks from ones
//! abandoned mid-flight.

use std::fmt;
use std::sync::Arc;

use condition_types::StatusValue;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::status::publisher::status_key;
use crate::store::{KvEntry, LivenessRegistry, StatusKv, StoreError};

/// Where a task stands from the point of view of a worker about to pick it up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// No status was ever published
    NotStarted,
    /// The task reached a terminal state
    Complete,
    /// A live worker owns the task
    InProgress,
    /// The owning worker is gone
    Orphaned,
    /// The stores could not be read
    Indeterminate,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "not started",
            TaskStatus::Complete => "complete",
            TaskStatus::InProgress => "in progress",
            TaskStatus::Orphaned => "orphaned",
            TaskStatus::Indeterminate => "indeterminate",
        };
        f.write_str(s)
    }
}

pub struct OrphanDetector {
    kv: Arc<dyn StatusKv>,
    registry: Arc<dyn LivenessRegistry>,
    facility_code: String,
}

impl OrphanDetector {
    pub fn new(
        kv: Arc<dyn StatusKv>,
        registry: Arc<dyn LivenessRegistry>,
        facility_code: impl Into<String>,
    ) -> Self {
        Self {
            kv,
            registry,
            facility_code: facility_code.into(),
        }
    }

    /// Classify a task
    pub async fn classify(&self, task_id: Uuid) -> TaskStatus {
        self.inspect(task_id).await.0
    }

    /// Classify a task and return its status entry, if any
    pub async fn inspect(&self, task_id: Uuid) -> (TaskStatus, Option<KvEntry>) {
        match self.try_inspect(task_id).await {
            Ok(found) => {
                debug!(task_id = %task_id, status = %found.0, "Inspected task");
                found
            }
            Err(e) => {
                warn!(task_id = %task_id, "Unable to determine task status: {}", e);
                (TaskStatus::Indeterminate, None)
            }
        }
    }

    async fn try_inspect(&self, task_id: Uuid) -> Result<(TaskStatus, Option<KvEntry>), StoreError> {
        let key = status_key(&self.facility_code, task_id);
        let Some(entry) = self.kv.get(&key).await? else {
            return Ok((TaskStatus::NotStarted, None));
        };

        let value: StatusValue = serde_json::from_slice(&entry.value)?;
        if value.state.is_terminal() {
            return Ok((TaskStatus::Complete, Some(entry)));
        }

        let status = match self.registry.last_contact(&value.worker_id).await? {
            Some(_) => TaskStatus::InProgress,
            None => TaskStatus::Orphaned,
        };
        Ok((status, Some(entry)))
    }
}
