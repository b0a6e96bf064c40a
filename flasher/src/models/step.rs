//! Step model

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::StepError;
use crate::models::state::{Resumable, State, STEP_MAX_ATTEMPTS};

/// Future returned by a step handler
pub type StepFuture = BoxFuture<'static, Result<(), StepError>>;

/// The operation a step performs, given the task's cancellation token
pub type StepHandler = Arc<dyn Fn(CancellationToken) -> StepFuture + Send + Sync>;

/// Stable step identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepName {
    PowerOnServer,
    CheckInstalledFirmware,
    DownloadFirmware,
    #[serde(rename = "preInstallResetBMC")]
    PreInstallResetBmc,
    PowerOffServer,
    UploadFirmware,
    PollUploadStatus,
    InstallUploadedFirmware,
    UploadFirmwareInitiateInstall,
    PollInstallStatus,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::PowerOnServer => "powerOnServer",
            StepName::CheckInstalledFirmware => "checkInstalledFirmware",
            StepName::DownloadFirmware => "downloadFirmware",
            StepName::PreInstallResetBmc => "preInstallResetBMC",
            StepName::PowerOffServer => "powerOffServer",
            StepName::UploadFirmware => "uploadFirmware",
            StepName::PollUploadStatus => "pollUploadStatus",
            StepName::InstallUploadedFirmware => "installUploadedFirmware",
            StepName::UploadFirmwareInitiateInstall => "uploadFirmwareInitiateInstall",
            StepName::PollInstallStatus => "pollInstallStatus",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Smallest executable unit inside an action.
///
/// The handler is not persisted; a resumed task gets its handlers bound again
/// by name during planning.
#[derive(Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: StepName,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub attempts: u32,
    #[serde(skip)]
    pub handler: Option<StepHandler>,
}

impl Step {
    /// A pending step without a handler
    pub fn pending(name: StepName) -> Self {
        Self {
            name,
            state: State::Pending,
            attempts: 0,
            handler: None,
        }
    }

    /// A pending step with a handler
    pub fn new(name: StepName, handler: StepHandler) -> Self {
        Self {
            handler: Some(handler),
            ..Self::pending(name)
        }
    }
}

impl Resumable for Step {
    const MAX_ATTEMPTS: u32 = STEP_MAX_ATTEMPTS;

    fn state(&self) -> State {
        self.state
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("handler", &self.handler.as_ref().map(|_| "fn"))
            .finish()
    }
}
