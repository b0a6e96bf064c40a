//! Task status publishing and liveness inspection

pub mod liveness;
pub mod publisher;

pub use liveness::{OrphanDetector, TaskStatus};
pub use publisher::{status_key, StatusPublisher};
