//! Condition models
//!
//! Task requests handed to the firmware install worker by the scheduler and
//! the status snapshots it writes back to the status store.

pub mod models;

pub use models::*;
