//! Device access
//!
//! A device is reached either through its BMC (out-of-band) or through an
//! agent in the host OS (in-band). Both expose the same [`DeviceQueryor`]
//! capability; which one a task uses is decided once, at initialize time.

pub mod simulated;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use condition_types::InstallMethod;
use fleetdb_client::{Asset, Component};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("device session not open")]
    NotOpen,

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("{0}")]
    Operation(String),
}

/// Host power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

/// Kind of firmware task tracked by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareTaskKind {
    Upload,
    Install,
}

impl fmt::Display for FirmwareTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareTaskKind::Upload => f.write_str("upload"),
            FirmwareTaskKind::Install => f.write_str("install"),
        }
    }
}

/// State of a firmware task as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareTaskState {
    Queued,
    Running,
    Complete,
    Failed,
    /// The install completes only after a host power cycle
    PowerCycleHost,
    /// The install completes only after a BMC reset
    PowerCycleBmc,
    Unknown,
}

/// Status of a firmware task
#[derive(Debug, Clone)]
pub struct FirmwareTaskStatus {
    pub state: FirmwareTaskState,
    pub detail: String,
}

/// Operations the worker needs from a device
#[async_trait]
pub trait DeviceQueryor: Send + Sync {
    /// Open a session
    async fn open(&self) -> Result<(), DeviceError>;

    /// Close the session
    async fn close(&self) -> Result<(), DeviceError>;

    /// Components and their installed firmware
    async fn inventory(&self) -> Result<Vec<Component>, DeviceError>;

    /// Install procedure the device requires for a component, as raw constants
    async fn firmware_install_steps(&self, component: &str) -> Result<Vec<String>, DeviceError>;

    /// Upload firmware, returns the upload task id
    async fn firmware_upload(&self, component: &str, file: &Path) -> Result<String, DeviceError>;

    /// Install previously uploaded firmware, returns the install task id
    async fn firmware_install_uploaded(
        &self,
        component: &str,
        upload_task_id: &str,
    ) -> Result<String, DeviceError>;

    /// Upload firmware and start the install in one call, returns the install task id
    async fn firmware_install_upload_and_initiate(
        &self,
        component: &str,
        file: &Path,
    ) -> Result<String, DeviceError>;

    /// Status of an upload or install task
    async fn firmware_task_status(
        &self,
        kind: FirmwareTaskKind,
        component: &str,
        task_id: &str,
        version: &str,
    ) -> Result<FirmwareTaskStatus, DeviceError>;

    async fn power_state(&self) -> Result<PowerState, DeviceError> {
        Err(DeviceError::Unsupported("power state".to_string()))
    }

    async fn set_power_state(&self, _state: PowerState) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("set power state".to_string()))
    }

    async fn reset_bmc(&self) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("bmc reset".to_string()))
    }
}

/// A device session bound to the install method chosen for the task
#[derive(Clone)]
pub enum Device {
    OutOfBand(Arc<dyn DeviceQueryor>),
    InBand(Arc<dyn DeviceQueryor>),
}

impl Device {
    pub fn new(method: InstallMethod, queryor: Arc<dyn DeviceQueryor>) -> Self {
        match method {
            InstallMethod::OutOfBand => Device::OutOfBand(queryor),
            InstallMethod::InBand => Device::InBand(queryor),
        }
    }

    pub fn method(&self) -> InstallMethod {
        match self {
            Device::OutOfBand(_) => InstallMethod::OutOfBand,
            Device::InBand(_) => InstallMethod::InBand,
        }
    }

    pub fn queryor(&self) -> &dyn DeviceQueryor {
        match self {
            Device::OutOfBand(q) | Device::InBand(q) => q.as_ref(),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({:?})", self.method())
    }
}

/// Creates device sessions for assets
#[async_trait]
pub trait DeviceFactory: Send + Sync {
    async fn connect(&self, method: InstallMethod, asset: &Asset) -> Result<Device, DeviceError>;
}
