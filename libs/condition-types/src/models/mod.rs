//! Condition API models

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version of the status value schema written to the status store
pub const STATUS_VALUE_SCHEMA_VERSION: &str = "1.1";

/// Lifecycle state shared by tasks, actions and steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConditionState {
    #[default]
    Pending,
    Active,
    Succeeded,
    Failed,
}

impl ConditionState {
    /// Succeeded and Failed are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConditionState::Succeeded | ConditionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionState::Pending => "pending",
            ConditionState::Active => "active",
            ConditionState::Succeeded => "succeeded",
            ConditionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConditionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How firmware is delivered to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// Through the device's management controller
    #[default]
    OutOfBand,
    /// Through an agent running in the host OS
    InBand,
}

/// A single firmware to install, supplied inline with the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareSpec {
    pub id: Uuid,
    pub component: String,
    pub vendor: String,
    #[serde(default)]
    pub models: Vec<String>,
    pub version: String,
    pub filename: String,
    pub url: String,
    pub checksum: String,
}

/// Parameters of a firmware install request
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FirmwareInstallParameters {
    pub asset_id: Uuid,

    /// Install even when the installed version already matches
    #[serde(default)]
    pub force_install: bool,

    /// Reset the BMC once before the first install
    #[serde(default)]
    pub reset_bmc_before_install: bool,

    /// Firmware set to resolve firmware from
    #[serde(default)]
    pub firmware_set_id: Option<Uuid>,

    /// Explicit firmware list, takes precedence over the firmware set
    #[serde(default)]
    pub firmwares: Vec<FirmwareSpec>,

    #[serde(default)]
    pub install_method: InstallMethod,
}

/// Test-only controls to exercise failure paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Fault {
    /// Panic at the first phase
    #[serde(default)]
    pub panic: bool,

    /// Fail the phase with this name
    #[serde(default)]
    pub fail_at: Option<String>,

    /// Sleep this long before the first phase, once
    #[serde(default, with = "duration_millis")]
    pub delay: Option<Duration>,
}

/// A unit of work handed over by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: Uuid,
    pub parameters: FirmwareInstallParameters,
    #[serde(default)]
    pub fault: Option<Fault>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Status snapshot written to the status store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusValue {
    pub worker_id: String,
    pub target: String,
    pub state: ConditionState,
    pub status: serde_json::Value,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    pub updated_at: DateTime<Utc>,
    pub msg_version: String,
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
