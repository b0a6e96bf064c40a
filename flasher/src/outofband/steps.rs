//! Step implementations for one action
//!
//! An [`ActionHandler`] holds what the steps of one action share: the device
//! session, the firmware, and the ids of device side tasks created along the
//! way. Step handlers are closures over it, bound by step name.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{Device, FirmwareTaskKind, FirmwareTaskState, PowerState};
use crate::errors::StepError;
use crate::filesys::dir::Dir;
use crate::firmware::FirmwareFetcher;
use crate::models::firmware::Firmware;
use crate::models::step::{StepHandler, StepName};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Firmware task polling
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub backoff: CooldownOptions,
    /// Give up once a task has not completed for this long
    pub max_wait: Duration,
    /// Consecutive status query errors tolerated
    pub max_errors: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            backoff: CooldownOptions {
                base_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(60),
                multiplier: 2.0,
            },
            max_wait: Duration::from_secs(3600),
            max_errors: 5,
        }
    }
}

#[derive(Default)]
struct ActionState {
    firmware_path: Option<PathBuf>,
    upload_task_id: Option<String>,
    install_task_id: Option<String>,
}

pub struct ActionHandler {
    device: Device,
    fetcher: Arc<dyn FirmwareFetcher>,
    firmware: Firmware,
    installed_version: Option<String>,
    force_install: bool,
    download_dir: Dir,
    poll: PollOptions,
    bmc_reset_settle: Duration,
    state: Mutex<ActionState>,
}

impl ActionHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Device,
        fetcher: Arc<dyn FirmwareFetcher>,
        firmware: Firmware,
        installed_version: Option<String>,
        force_install: bool,
        download_dir: Dir,
        poll: PollOptions,
        bmc_reset_settle: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            fetcher,
            firmware,
            installed_version,
            force_install,
            download_dir,
            poll,
            bmc_reset_settle,
            state: Mutex::new(ActionState::default()),
        })
    }

    /// Handler for the named step
    pub fn step_fn(self: &Arc<Self>, name: StepName) -> StepHandler {
        let this = self.clone();
        Arc::new(move |ctx| {
            let this = this.clone();
            async move { this.run_step(name, ctx).await }.boxed()
        })
    }

    fn component(&self) -> &str {
        &self.firmware.component
    }

    fn lock(&self) -> MutexGuard<'_, ActionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_step(&self, name: StepName, ctx: CancellationToken) -> Result<(), StepError> {
        debug!(component = %self.component(), step = %name, "Step started");

        match name {
            StepName::PowerOnServer => self.set_power(PowerState::On).await,
            StepName::CheckInstalledFirmware => self.check_installed(),
            StepName::DownloadFirmware => self.firmware_path(&ctx).await.map(|_| ()),
            StepName::PreInstallResetBmc => self.reset_bmc(&ctx).await,
            StepName::PowerOffServer => self.set_power(PowerState::Off).await,
            StepName::UploadFirmware => self.upload(&ctx).await,
            StepName::PollUploadStatus => {
                let task_id = self.lock().upload_task_id.clone().unwrap_or_default();
                self.poll_task(&ctx, FirmwareTaskKind::Upload, &task_id).await
            }
            StepName::InstallUploadedFirmware => self.install_uploaded().await,
            StepName::UploadFirmwareInitiateInstall => self.upload_and_install(&ctx).await,
            StepName::PollInstallStatus => {
                let task_id = self.lock().install_task_id.clone().unwrap_or_default();
                self.poll_task(&ctx, FirmwareTaskKind::Install, &task_id).await
            }
        }
    }

    async fn set_power(&self, power: PowerState) -> Result<(), StepError> {
        let device = self.device.queryor();
        if device.power_state().await? == power {
            debug!("Host power already {:?}", power);
            return Ok(());
        }

        info!(component = %self.component(), "Setting host power {:?}", power);
        device.set_power_state(power).await?;
        Ok(())
    }

    fn check_installed(&self) -> Result<(), StepError> {
        if self.force_install {
            return Ok(());
        }

        let Some(installed) = self.installed_version.as_deref() else {
            return Ok(());
        };

        let installed = installed.trim();
        if !installed.is_empty() && installed.eq_ignore_ascii_case(self.firmware.version.trim()) {
            return Err(StepError::InstalledFirmwareEqual);
        }

        Ok(())
    }

    /// Local artifact path, fetching it if this process has not yet
    async fn firmware_path(&self, ctx: &CancellationToken) -> Result<PathBuf, StepError> {
        if let Some(path) = self.lock().firmware_path.clone() {
            return Ok(path);
        }

        let path = self
            .fetcher
            .fetch(ctx, &self.firmware, &self.download_dir)
            .await?;
        self.lock().firmware_path = Some(path.clone());
        Ok(path)
    }

    async fn reset_bmc(&self, ctx: &CancellationToken) -> Result<(), StepError> {
        info!(component = %self.component(), "Resetting BMC");
        self.device.queryor().reset_bmc().await?;
        settle(ctx, self.bmc_reset_settle).await
    }

    async fn upload(&self, ctx: &CancellationToken) -> Result<(), StepError> {
        let path = self.firmware_path(ctx).await?;
        let task_id = self
            .device
            .queryor()
            .firmware_upload(self.component(), &path)
            .await?;

        debug!(component = %self.component(), task_id = %task_id, "Firmware uploaded");
        self.lock().upload_task_id = Some(task_id);
        Ok(())
    }

    async fn install_uploaded(&self) -> Result<(), StepError> {
        let upload_task_id = self.lock().upload_task_id.clone().unwrap_or_default();
        let task_id = self
            .device
            .queryor()
            .firmware_install_uploaded(self.component(), &upload_task_id)
            .await?;

        self.lock().install_task_id = Some(task_id);
        Ok(())
    }

    async fn upload_and_install(&self, ctx: &CancellationToken) -> Result<(), StepError> {
        let path = self.firmware_path(ctx).await?;
        let task_id = self
            .device
            .queryor()
            .firmware_install_upload_and_initiate(self.component(), &path)
            .await?;

        debug!(component = %self.component(), task_id = %task_id, "Firmware install initiated");
        self.lock().install_task_id = Some(task_id);
        Ok(())
    }

    async fn poll_task(
        &self,
        ctx: &CancellationToken,
        kind: FirmwareTaskKind,
        task_id: &str,
    ) -> Result<(), StepError> {
        let device = self.device.queryor();
        let started = Instant::now();
        let mut attempt = 0;
        let mut errors = 0;

        loop {
            if started.elapsed() > self.poll.max_wait {
                return Err(StepError::Failed(format!(
                    "{} {} task did not complete within {:?}",
                    self.component(),
                    kind,
                    self.poll.max_wait
                )));
            }

            match device
                .firmware_task_status(kind, self.component(), task_id, &self.firmware.version)
                .await
            {
                Ok(status) => {
                    errors = 0;
                    debug!(
                        component = %self.component(),
                        state = ?status.state,
                        "Firmware {} task status: {}", kind, status.detail
                    );

                    match status.state {
                        FirmwareTaskState::Complete => return Ok(()),
                        FirmwareTaskState::Failed => {
                            return Err(StepError::Failed(format!(
                                "{} {} task failed: {}",
                                self.component(),
                                kind,
                                status.detail
                            )))
                        }
                        FirmwareTaskState::PowerCycleHost => {
                            return Err(StepError::HostPowerCycleRequired)
                        }
                        FirmwareTaskState::PowerCycleBmc => self.reset_bmc(ctx).await?,
                        FirmwareTaskState::Queued
                        | FirmwareTaskState::Running
                        | FirmwareTaskState::Unknown => {}
                    }
                }
                Err(e) => {
                    errors += 1;
                    warn!(
                        component = %self.component(),
                        errors,
                        "Firmware {} task status query failed: {}", kind, e
                    );
                    if errors >= self.poll.max_errors {
                        return Err(e.into());
                    }
                }
            }

            let delay = calc_exp_backoff(&self.poll.backoff, attempt);
            attempt += 1;
            settle(ctx, delay).await?;
        }
    }
}

/// Sleep unless cancelled first
async fn settle(ctx: &CancellationToken, delay: Duration) -> Result<(), StepError> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = ctx.cancelled() => Err(StepError::Cancelled),
    }
}
