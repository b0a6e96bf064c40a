use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use condition_types::TaskRequest;
use uuid::Uuid;

use crate::errors::FlasherError;
use crate::queue::TaskQueue;

/// In-memory queue
#[derive(Default)]
pub struct MemoryQueue {
    requests: Mutex<VecDeque<TaskRequest>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: TaskRequest) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(request);
    }

    pub fn len(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn fetch(&self, limit: usize) -> Result<Vec<TaskRequest>, FlasherError> {
        let requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        Ok(requests.iter().take(limit).cloned().collect())
    }

    async fn ack(&self, id: Uuid) -> Result<(), FlasherError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|r| r.id != id);
        Ok(())
    }
}
