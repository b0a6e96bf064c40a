//! Error types for the flasher worker

use thiserror::Error;

use crate::device::DeviceError;
use crate::firmware::FetchError;
use crate::inventory::InventoryError;
use crate::limiter::LimiterError;
use crate::models::state::State;
use crate::models::step::StepName;
use crate::planner::PlanError;
use crate::store::StoreError;

/// Main error type for the flasher worker
#[derive(Error, Debug)]
pub enum FlasherError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Inventory error: {0}")]
    InventoryError(#[from] InventoryError),

    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),

    #[error("Dispatch error: {0}")]
    LimiterError(#[from] LimiterError),

    #[error("Task error: {0}")]
    TaskError(#[from] TaskError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

/// Error returned by a step handler.
///
/// Two variants are control-flow sentinels rather than failures:
/// [`StepError::InstalledFirmwareEqual`] ends the action early as a success and
/// [`StepError::HostPowerCycleRequired`] halts the action until the host is
/// power cycled.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("installed firmware equals requested version")]
    InstalledFirmwareEqual,

    #[error("host power cycle required")]
    HostPowerCycleRequired,

    #[error("step cancelled")]
    Cancelled,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Failed(String),
}

/// Error returned by the task runner and its phases
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("planning error: {0}")]
    Planning(String),

    #[error("{unit} reached maximum attempts: {attempts}")]
    MaxAttempts { unit: String, attempts: u32 },

    #[error("step {step} failed on component {component}: {source}")]
    Step {
        step: StepName,
        component: String,
        #[source]
        source: StepError,
    },

    #[error("install failed on component {component}: {source}")]
    Action {
        component: String,
        #[source]
        source: Box<TaskError>,
    },

    #[error("host power cycle required to complete install on component {component}")]
    HostPowerCycleRequired { component: String },

    #[error("fault injected at phase {0}")]
    FaultInjected(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("step {step} has no handler")]
    NilHandler { step: StepName },

    #[error("task already in terminal state: {0}")]
    Terminal(State),

    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

impl TaskError {
    /// True for errors that must reach the caller without an action wrapper
    pub fn is_passthrough(&self) -> bool {
        matches!(
            self,
            TaskError::HostPowerCycleRequired { .. } | TaskError::Cancelled
        )
    }
}
