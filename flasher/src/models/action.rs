//! Action model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::firmware::Firmware;
use crate::models::state::{Resumable, State, ACTION_MAX_ATTEMPTS};
use crate::models::step::{Step, StepName};

/// Firmware install workflow for one component of a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// `{task id}-{component}-{index}`
    pub id: String,
    pub task_id: Uuid,

    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub attempts: u32,

    pub firmware: Firmware,

    /// Install even when the installed version matches
    pub force_install: bool,

    /// Reset the BMC before installing
    pub bmc_reset_pre_install: bool,

    /// Reset the BMC once the install completed
    pub bmc_reset_post_install: bool,

    /// Reset the BMC when the install fails
    pub bmc_reset_on_install_failure: bool,

    /// Power the host off before installing
    pub host_power_off_pre_install: bool,

    /// First action of the task
    pub first: bool,

    /// Last action of the task
    pub last: bool,

    pub steps: Vec<Step>,
}

impl Action {
    /// Names of the planned steps, in order
    pub fn step_names(&self) -> Vec<StepName> {
        self.steps.iter().map(|s| s.name).collect()
    }

    pub fn component(&self) -> &str {
        &self.firmware.component
    }
}

impl Resumable for Action {
    const MAX_ATTEMPTS: u32 = ACTION_MAX_ATTEMPTS;

    fn state(&self) -> State {
        self.state
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Deterministic action id
pub fn action_id(task_id: Uuid, component: &str, index: usize) -> String {
    format!("{}-{}-{}", task_id, component.to_lowercase(), index)
}
