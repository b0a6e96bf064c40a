//! Flasher Library
//!
//! Out-of-band firmware install engine: plans install actions per component,
//! runs them as resumable steps, publishes progress with optimistic
//! concurrency and resumes tasks orphaned by dead workers.

pub mod app;
pub mod device;
pub mod errors;
pub mod filesys;
pub mod firmware;
pub mod inventory;
pub mod limiter;
pub mod logs;
pub mod models;
pub mod outofband;
pub mod planner;
pub mod queue;
pub mod runner;
pub mod status;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
