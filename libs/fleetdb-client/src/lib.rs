//! Fleet database models
//!
//! Wire types for the asset inventory consumed by the firmware install worker.

pub mod models;

pub use models::*;
