//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;
use crate::runner::executor::HostPowerCyclePolicy;

/// Worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write a rolling log file under the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Base directory for status, liveness, task spool and downloads
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Facility this worker serves, part of every status key
    #[serde(default = "default_facility_code")]
    pub facility_code: String,

    /// Human readable worker name registered for liveness
    #[serde(default = "default_worker_name")]
    pub worker_name: String,

    /// Maximum number of tasks run in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Use the simulated device and skip firmware downloads
    #[serde(default)]
    pub dry_run: bool,

    /// Interval between task queue polls in seconds
    #[serde(default = "default_task_poll_interval")]
    pub task_poll_interval_secs: u64,

    /// Inventory configuration
    #[serde(default)]
    pub inventory: InventorySettings,

    /// Liveness configuration
    #[serde(default)]
    pub liveness: LivenessSettings,

    /// BMC interaction configuration
    #[serde(default)]
    pub bmc: BmcSettings,

    /// What to do when an install needs the host power cycled
    #[serde(default)]
    pub host_power_cycle: HostPowerCyclePolicy,

    /// Maximum time to wait for in-flight tasks on shutdown, in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_base_dir() -> String {
    "/var/lib/flasher".to_string()
}

fn default_facility_code() -> String {
    "sandbox".to_string()
}

fn default_worker_name() -> String {
    "flasher".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_task_poll_interval() -> u64 {
    10
}

fn default_max_shutdown_delay() -> u64 {
    600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            base_dir: default_base_dir(),
            facility_code: default_facility_code(),
            worker_name: default_worker_name(),
            concurrency: default_concurrency(),
            dry_run: false,
            task_poll_interval_secs: default_task_poll_interval(),
            inventory: InventorySettings::default(),
            liveness: LivenessSettings::default(),
            bmc: BmcSettings::default(),
            host_power_cycle: HostPowerCyclePolicy::default(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

/// Inventory (fleet database) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    /// Base URL for the inventory API
    #[serde(default = "default_inventory_url")]
    pub base_url: String,

    /// Bearer token for the inventory API
    #[serde(default)]
    pub token: Option<String>,
}

fn default_inventory_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            base_url: default_inventory_url(),
            token: None,
        }
    }
}

/// Liveness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessSettings {
    /// A worker that has not checked in for this long is presumed dead
    #[serde(default = "default_liveness_ttl")]
    pub ttl_secs: u64,

    /// Check-in interval, must be shorter than the TTL
    #[serde(default = "default_checkin_interval")]
    pub checkin_interval_secs: u64,
}

fn default_liveness_ttl() -> u64 {
    180
}

fn default_checkin_interval() -> u64 {
    30
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_liveness_ttl(),
            checkin_interval_secs: default_checkin_interval(),
        }
    }
}

/// BMC interaction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmcSettings {
    /// Initial delay between firmware task status polls, in seconds
    #[serde(default = "default_poll_base_delay")]
    pub poll_base_delay_secs: u64,

    /// Upper bound for the poll delay, in seconds
    #[serde(default = "default_poll_max_delay")]
    pub poll_max_delay_secs: u64,

    /// Give up polling a firmware task after this long, in seconds
    #[serde(default = "default_poll_max_wait")]
    pub poll_max_wait_secs: u64,

    /// Consecutive status query errors tolerated while polling
    #[serde(default = "default_poll_max_errors")]
    pub poll_max_errors: u32,

    /// Time the BMC needs to come back after a reset, in seconds
    #[serde(default = "default_reset_settle")]
    pub reset_settle_secs: u64,
}

fn default_poll_base_delay() -> u64 {
    10
}

fn default_poll_max_delay() -> u64 {
    60
}

fn default_poll_max_wait() -> u64 {
    3600
}

fn default_poll_max_errors() -> u32 {
    5
}

fn default_reset_settle() -> u64 {
    120
}

impl Default for BmcSettings {
    fn default() -> Self {
        Self {
            poll_base_delay_secs: default_poll_base_delay(),
            poll_max_delay_secs: default_poll_max_delay(),
            poll_max_wait_secs: default_poll_max_wait(),
            poll_max_errors: default_poll_max_errors(),
            reset_settle_secs: default_reset_settle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "facility_code": "ams1",
                "concurrency": 4,
                "host_power_cycle": { "policy": "power_cycle", "max_cycles": 2 }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.facility_code, "ams1");
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.liveness.ttl_secs, 180);
        assert_eq!(settings.bmc.poll_max_errors, 5);
        assert_eq!(
            settings.host_power_cycle,
            HostPowerCyclePolicy::PowerCycle { max_cycles: 2 }
        );
    }
}
