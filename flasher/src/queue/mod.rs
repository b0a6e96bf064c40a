//! Task queue
//!
//! Source of task requests. A request stays queued until acknowledged, so a
//! worker that dies mid-task sees it again after a restart.

pub mod memory;
pub mod spool;

use async_trait::async_trait;
use condition_types::TaskRequest;
use uuid::Uuid;

use crate::errors::FlasherError;

pub use memory::MemoryQueue;
pub use spool::SpoolQueue;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Up to `limit` pending requests, oldest first
    async fn fetch(&self, limit: usize) -> Result<Vec<TaskRequest>, FlasherError>;

    /// Remove a request from the queue
    async fn ack(&self, id: Uuid) -> Result<(), FlasherError>;
}
