//! Simulated device
//!
//! Backs dry runs and tests. Records every call it receives so callers can
//! assert on the exact sequence of device operations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use condition_types::InstallMethod;
use fleetdb_client::{Asset, Component};
use tracing::debug;

use crate::device::{
    Device, DeviceError, DeviceFactory, DeviceQueryor, FirmwareTaskKind, FirmwareTaskState,
    FirmwareTaskStatus, PowerState,
};

const DRY_RUN_COMPONENTS: &[&str] = &["bmc", "bios", "cpld", "nic", "drive", "psu"];

struct SimState {
    open: bool,
    components: Vec<Component>,
    install_steps: HashMap<String, Vec<String>>,
    default_install_steps: Vec<String>,
    power: PowerState,
    task_states: VecDeque<FirmwareTaskState>,
    failing_components: HashSet<String>,
    calls: Vec<String>,
    task_seq: u32,
}

/// In-memory device
pub struct SimulatedDevice {
    state: Mutex<SimState>,
}

impl SimulatedDevice {
    /// Create a device reporting the given components
    pub fn new(components: Vec<Component>) -> Self {
        Self {
            state: Mutex::new(SimState {
                open: false,
                components,
                install_steps: HashMap::new(),
                default_install_steps: vec![
                    "uploadInitiateInstall".to_string(),
                    "installStatus".to_string(),
                ],
                power: PowerState::On,
                task_states: VecDeque::new(),
                failing_components: HashSet::new(),
                calls: Vec::new(),
                task_seq: 0,
            }),
        }
    }

    /// A device with the common component slugs and no known firmware
    pub fn dry_run() -> Self {
        let components = DRY_RUN_COMPONENTS
            .iter()
            .map(|slug| Component {
                slug: slug.to_string(),
                vendor: String::new(),
                model: String::new(),
                serial: String::new(),
                firmware_installed: String::new(),
            })
            .collect();

        Self::new(components)
    }

    /// Install procedure reported for one component
    pub fn with_install_steps(mut self, component: &str, steps: &[&str]) -> Self {
        self.state_mut()
            .install_steps
            .insert(component.to_lowercase(), steps.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Install procedure reported for components without an explicit one
    pub fn with_default_install_steps(mut self, steps: &[&str]) -> Self {
        self.state_mut().default_install_steps = steps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_power_state(mut self, power: PowerState) -> Self {
        self.state_mut().power = power;
        self
    }

    /// Firmware task states returned by successive status queries, then Complete
    pub fn with_task_states(mut self, states: Vec<FirmwareTaskState>) -> Self {
        self.state_mut().task_states = states.into();
        self
    }

    /// Uploads and installs for this component fail
    pub fn with_failing_component(mut self, component: &str) -> Self {
        self.state_mut()
            .failing_components
            .insert(component.to_lowercase());
        self
    }

    /// Calls received so far, e.g. `upload_and_initiate:nic`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn current_power_state(&self) -> PowerState {
        self.lock().power
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&mut self) -> &mut SimState {
        self.state.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: String) -> MutexGuard<'_, SimState> {
        debug!("Simulated device call: {}", call);
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    fn next_task_id(state: &mut SimState, prefix: &str) -> String {
        state.task_seq += 1;
        format!("{}-{}", prefix, state.task_seq)
    }
}

#[async_trait]
impl DeviceQueryor for SimulatedDevice {
    async fn open(&self) -> Result<(), DeviceError> {
        self.record("open".to_string()).open = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), DeviceError> {
        self.record("close".to_string()).open = false;
        Ok(())
    }

    async fn inventory(&self) -> Result<Vec<Component>, DeviceError> {
        let state = self.record("inventory".to_string());
        if !state.open {
            return Err(DeviceError::NotOpen);
        }
        Ok(state.components.clone())
    }

    async fn firmware_install_steps(&self, component: &str) -> Result<Vec<String>, DeviceError> {
        let state = self.record(format!("install_steps:{}", component));
        Ok(state
            .install_steps
            .get(&component.to_lowercase())
            .cloned()
            .unwrap_or_else(|| state.default_install_steps.clone()))
    }

    async fn firmware_upload(&self, component: &str, _file: &Path) -> Result<String, DeviceError> {
        let mut state = self.record(format!("upload:{}", component));
        if state.failing_components.contains(&component.to_lowercase()) {
            return Err(DeviceError::Operation(format!("upload rejected for {}", component)));
        }
        Ok(Self::next_task_id(&mut state, "upload"))
    }

    async fn firmware_install_uploaded(
        &self,
        component: &str,
        _upload_task_id: &str,
    ) -> Result<String, DeviceError> {
        let mut state = self.record(format!("install_uploaded:{}", component));
        Ok(Self::next_task_id(&mut state, "install"))
    }

    async fn firmware_install_upload_and_initiate(
        &self,
        component: &str,
        _file: &Path,
    ) -> Result<String, DeviceError> {
        let mut state = self.record(format!("upload_and_initiate:{}", component));
        if state.failing_components.contains(&component.to_lowercase()) {
            return Err(DeviceError::Operation(format!("install rejected for {}", component)));
        }
        Ok(Self::next_task_id(&mut state, "install"))
    }

    async fn firmware_task_status(
        &self,
        kind: FirmwareTaskKind,
        component: &str,
        _task_id: &str,
        _version: &str,
    ) -> Result<FirmwareTaskStatus, DeviceError> {
        let mut state = self.record(format!("task_status:{}:{}", kind, component));
        let task_state = state
            .task_states
            .pop_front()
            .unwrap_or(FirmwareTaskState::Complete);

        Ok(FirmwareTaskStatus {
            state: task_state,
            detail: format!("simulated {} task", kind),
        })
    }

    async fn power_state(&self) -> Result<PowerState, DeviceError> {
        Ok(self.record("power_state".to_string()).power)
    }

    async fn set_power_state(&self, power: PowerState) -> Result<(), DeviceError> {
        let call = match power {
            PowerState::On => "power_on",
            PowerState::Off => "power_off",
            PowerState::Unknown => {
                return Err(DeviceError::Operation("cannot set unknown power state".to_string()))
            }
        };
        self.record(call.to_string()).power = power;
        Ok(())
    }

    async fn reset_bmc(&self) -> Result<(), DeviceError> {
        drop(self.record("reset_bmc".to_string()));
        Ok(())
    }
}

/// Hands out the same simulated device for every asset
pub struct SimulatedDeviceFactory {
    device: Arc<SimulatedDevice>,
}

impl SimulatedDeviceFactory {
    pub fn new(device: Arc<SimulatedDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> Arc<SimulatedDevice> {
        self.device.clone()
    }
}

#[async_trait]
impl DeviceFactory for SimulatedDeviceFactory {
    async fn connect(&self, method: InstallMethod, asset: &Asset) -> Result<Device, DeviceError> {
        debug!("Connecting simulated {:?} device for asset {}", method, asset.id);
        Ok(Device::new(method, self.device.clone()))
    }
}
