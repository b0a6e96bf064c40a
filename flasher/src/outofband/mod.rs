//! Task handler driving a device through its BMC
//!
//! Implements the task phases on top of the device, inventory and firmware
//! collaborators, and binds the step handlers of each planned action.

pub mod steps;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use condition_types::InstallMethod;
use fleetdb_client::{Asset, Component};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::device::{Device, DeviceFactory, PowerState};
use crate::errors::TaskError;
use crate::filesys::dir::Dir;
use crate::firmware::FirmwareFetcher;
use crate::inventory::{resolve_firmware, Inventory};
use crate::models::action::Action;
use crate::models::task::Task;
use crate::models::worker::WorkerIdentity;
use crate::planner::{plan_action, ActionParams};
use crate::runner::{run_actions, ActionOutcome, HostPowerCyclePolicy, TaskHandler};
use crate::status::StatusPublisher;

pub use steps::{ActionHandler, PollOptions};

/// Settings shared by every task a worker runs
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub download_dir: Dir,
    pub poll: PollOptions,
    /// Pause after a BMC reset before talking to it again
    pub bmc_reset_settle: Duration,
    pub host_power_cycle: HostPowerCyclePolicy,
}

/// Collaborators a handler works with
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: Arc<dyn Inventory>,
    pub devices: Arc<dyn DeviceFactory>,
    pub fetcher: Arc<dyn FirmwareFetcher>,
}

pub struct OutOfBandHandler {
    worker: WorkerIdentity,
    collaborators: Collaborators,
    publisher: StatusPublisher,
    options: HandlerOptions,
    asset: Option<Asset>,
    device: Option<Device>,
    components: Vec<Component>,
}

impl OutOfBandHandler {
    pub fn new(
        worker: WorkerIdentity,
        collaborators: Collaborators,
        publisher: StatusPublisher,
        options: HandlerOptions,
    ) -> Self {
        Self {
            worker,
            collaborators,
            publisher,
            options,
            asset: None,
            device: None,
            components: Vec::new(),
        }
    }

    /// The device session opened at initialize
    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    fn session(&self) -> Result<&Device, TaskError> {
        self.device
            .as_ref()
            .ok_or_else(|| TaskError::Device(crate::device::DeviceError::NotOpen))
    }

    fn installed_version(&self, component: &str) -> Option<String> {
        self.components
            .iter()
            .find(|c| c.slug.eq_ignore_ascii_case(component))
            .map(|c| c.firmware_installed.clone())
    }

    /// Put the host back into the power state it had before the task.
    ///
    /// A host found off is powered off again. A host the first action powered
    /// off for the install is powered back on.
    async fn restore_host_power(&self, task: &mut Task) -> Result<(), TaskError> {
        let powered_off_for_install = task
            .actions_planned
            .iter()
            .any(|a| a.host_power_off_pre_install);

        let target = match task.data.host_power_state_initial {
            Some(PowerState::Off) => PowerState::Off,
            _ if powered_off_for_install => PowerState::On,
            _ => return Ok(()),
        };

        let device = self.session()?.queryor();
        let result = match device.power_state().await {
            Ok(current) if current == target => Ok(()),
            _ => device.set_power_state(target).await,
        };

        match result {
            Ok(()) => task.append_status(format!(
                "host power {:?}, restoring initial power state",
                target
            )),
            Err(e) => warn!(task_id = %task.id, "Unable to restore host power state: {}", e),
        }
        Ok(())
    }

    fn bind_handlers(&self, device: &Device, action: &mut Action) {
        let handler = ActionHandler::new(
            device.clone(),
            self.collaborators.fetcher.clone(),
            action.firmware.clone(),
            self.installed_version(action.component()),
            action.force_install,
            self.options.download_dir.clone(),
            self.options.poll.clone(),
            self.options.bmc_reset_settle,
        );

        for step in action.steps.iter_mut() {
            step.handler = Some(handler.step_fn(step.name));
        }
    }

    async fn close_device(&mut self) {
        if let Some(device) = self.device.take() {
            if let Err(e) = device.queryor().close().await {
                warn!("Failed to close device session: {}", e);
            }
        }
    }

    async fn reset_bmc(&self, ctx: &CancellationToken) -> Result<(), TaskError> {
        let device = self.session()?;
        device.queryor().reset_bmc().await?;

        tokio::select! {
            _ = tokio::time::sleep(self.options.bmc_reset_settle) => Ok(()),
            _ = ctx.cancelled() => Err(TaskError::Cancelled),
        }
    }
}

#[async_trait]
impl TaskHandler for OutOfBandHandler {
    async fn initialize(
        &mut self,
        _ctx: &CancellationToken,
        task: &mut Task,
    ) -> Result<(), TaskError> {
        let asset = self
            .collaborators
            .inventory
            .asset_by_id(task.asset_id())
            .await?;

        let device = self
            .collaborators
            .devices
            .connect(task.parameters.install_method, &asset)
            .await?;
        device.queryor().open().await?;

        info!(
            worker = %self.worker,
            task_id = %task.id,
            asset_id = %asset.id,
            method = ?device.method(),
            "Device session opened"
        );

        if device.method() == InstallMethod::OutOfBand && task.data.host_power_state_initial.is_none() {
            match device.queryor().power_state().await {
                Ok(power) => task.data.host_power_state_initial = Some(power),
                Err(e) => warn!(task_id = %task.id, "Unable to read host power state: {}", e),
            }
        }

        task.append_status(format!("connected to {} {} {}", asset.vendor, asset.model, asset.id));
        self.asset = Some(asset);
        self.device = Some(device);
        Ok(())
    }

    async fn query(&mut self, _ctx: &CancellationToken, task: &mut Task) -> Result<(), TaskError> {
        let device = self.session()?.clone();
        self.components = device.queryor().inventory().await?;
        task.append_status(format!(
            "device inventory collected, {} components",
            self.components.len()
        ));

        if !task.firmwares_planned.is_empty() {
            return Ok(());
        }

        let asset = self
            .asset
            .as_ref()
            .ok_or_else(|| TaskError::Planning("asset not loaded".to_string()))?;

        let resolved = resolve_firmware(
            self.collaborators.inventory.as_ref(),
            asset,
            &task.parameters,
            &self.components,
        )
        .await?;

        for component in &resolved.dropped {
            task.append_status(format!(
                "skipping {} firmware, component not present on device",
                component
            ));
        }

        task.firmwares_planned = resolved.firmwares;
        Ok(())
    }

    async fn plan_actions(
        &mut self,
        _ctx: &CancellationToken,
        task: &mut Task,
    ) -> Result<(), TaskError> {
        let device = self.session()?.clone();

        if !task.actions_planned.is_empty() {
            let mut actions = std::mem::take(&mut task.actions_planned);
            for action in actions.iter_mut() {
                self.bind_handlers(&device, action);
            }
            task.actions_planned = actions;
            task.append_status("resuming planned actions");
            return Ok(());
        }

        let count = task.firmwares_planned.len();
        let mut actions = Vec::with_capacity(count);

        for (index, firmware) in task.firmwares_planned.iter().enumerate() {
            let requirements = device
                .queryor()
                .firmware_install_steps(&firmware.component)
                .await?;

            let params = ActionParams {
                task_id: task.id,
                method: device.method(),
                index,
                count,
                force_install: task.parameters.force_install,
                reset_bmc_before_install: task.parameters.reset_bmc_before_install,
            };

            let mut action = plan_action(&params, firmware.clone(), &requirements)?;
            self.bind_handlers(&device, &mut action);
            actions.push(action);
        }

        task.actions_planned = actions;
        task.append_status(format!("planned {} actions", count));
        Ok(())
    }

    async fn run_actions(
        &mut self,
        ctx: &CancellationToken,
        task: &mut Task,
    ) -> Result<(), TaskError> {
        let policy = self.options.host_power_cycle;
        run_actions(ctx, task, self, policy).await
    }

    async fn on_success(&mut self, _ctx: &CancellationToken, _task: &mut Task) {
        self.close_device().await;
    }

    async fn on_failure(&mut self, _ctx: &CancellationToken, _task: &mut Task) {
        self.close_device().await;
    }

    async fn publish(&mut self, task: &Task) {
        self.publisher.publish(task).await;
    }

    async fn after_action(
        &mut self,
        ctx: &CancellationToken,
        task: &mut Task,
        action_index: usize,
        outcome: ActionOutcome,
    ) -> Result<(), TaskError> {
        let action = &task.actions_planned[action_index];
        let component = action.component().to_string();
        let reset_bmc = outcome == ActionOutcome::Installed && action.bmc_reset_post_install;
        let last = action.last;

        if reset_bmc {
            info!(task_id = %task.id, "Resetting BMC after {} install", component);
            self.reset_bmc(ctx).await?;
            task.append_status(format!("BMC reset after {} install", component));
        }

        let out_of_band = self.session()?.method() == InstallMethod::OutOfBand;
        if last && out_of_band {
            self.restore_host_power(task).await?;
        }

        Ok(())
    }

    async fn action_failed(&mut self, ctx: &CancellationToken, task: &mut Task, action_index: usize) {
        if !task.actions_planned[action_index].bmc_reset_on_install_failure {
            return;
        }

        let component = task.actions_planned[action_index].component().to_string();
        match self.reset_bmc(ctx).await {
            Ok(()) => task.append_status(format!("BMC reset after failed {} install", component)),
            Err(e) => warn!(task_id = %task.id, "BMC reset after failed install: {}", e),
        }
    }

    async fn power_cycle_host(&mut self, ctx: &CancellationToken) -> Result<(), TaskError> {
        let device = self.session()?.queryor();
        device.set_power_state(PowerState::Off).await?;

        tokio::select! {
            _ = tokio::time::sleep(self.options.bmc_reset_settle) => {}
            _ = ctx.cancelled() => return Err(TaskError::Cancelled),
        }

        device.set_power_state(PowerState::On).await?;
        Ok(())
    }
}
