//! Task, action and step models

pub mod action;
pub mod firmware;
pub mod state;
pub mod step;
pub mod task;
pub mod worker;
