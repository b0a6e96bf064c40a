//! Shared fixtures

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use condition_types::{FirmwareInstallParameters, FirmwareSpec, TaskRequest};
use fleetdb_client::Component;
use uuid::Uuid;

use flasher::device::simulated::{SimulatedDevice, SimulatedDeviceFactory};
use flasher::filesys::dir::Dir;
use flasher::firmware::NoopFetcher;
use flasher::inventory::memory::MemoryInventory;
use flasher::models::worker::WorkerIdentity;
use flasher::outofband::{Collaborators, HandlerOptions, PollOptions};
use flasher::runner::HostPowerCyclePolicy;
use flasher::utils::CooldownOptions;

pub const FACILITY: &str = "sandbox";

pub fn worker() -> WorkerIdentity {
    WorkerIdentity::new("flasher-test", FACILITY)
}

pub fn component(slug: &str, installed: &str) -> Component {
    Component {
        slug: slug.to_string(),
        firmware_installed: installed.to_string(),
        ..Default::default()
    }
}

pub fn firmware_spec(component: &str, version: &str) -> FirmwareSpec {
    FirmwareSpec {
        id: Uuid::new_v4(),
        component: component.to_string(),
        vendor: "acme".to_string(),
        models: Vec::new(),
        version: version.to_string(),
        filename: format!("{}-{}.bin", component, version),
        url: format!("https://firmware.example.com/{}-{}.bin", component, version),
        checksum: String::new(),
    }
}

pub fn request(firmwares: Vec<FirmwareSpec>) -> TaskRequest {
    TaskRequest {
        id: Uuid::new_v4(),
        parameters: FirmwareInstallParameters {
            asset_id: Uuid::new_v4(),
            firmwares,
            ..Default::default()
        },
        fault: None,
        trace_id: None,
        span_id: None,
        created_at: Utc::now(),
    }
}

pub fn handler_options() -> HandlerOptions {
    HandlerOptions {
        download_dir: Dir::new(std::env::temp_dir()),
        poll: PollOptions {
            backoff: CooldownOptions {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 2.0,
            },
            max_wait: Duration::from_secs(5),
            max_errors: 3,
        },
        bmc_reset_settle: Duration::from_millis(1),
        host_power_cycle: HostPowerCyclePolicy::Fail,
    }
}

pub fn collaborators(device: Arc<SimulatedDevice>) -> Collaborators {
    Collaborators {
        inventory: Arc::new(MemoryInventory::new()),
        devices: Arc::new(SimulatedDeviceFactory::new(device)),
        fetcher: Arc::new(NoopFetcher),
    }
}
