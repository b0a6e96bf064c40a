//! Long running workers

pub mod liveness;
pub mod tasks;
