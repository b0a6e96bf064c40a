//! Action planning
//!
//! Turns the install procedure a device reports for a component into an
//! ordered list of steps, and wraps it into an [`Action`].

pub mod requirements;

use condition_types::InstallMethod;
use thiserror::Error;
use uuid::Uuid;

use crate::models::action::{action_id, Action};
use crate::models::firmware::Firmware;
use crate::models::state::State;
use crate::models::step::{Step, StepName};

pub use requirements::InstallRequirement;

/// Planning errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("install step constant not supported: {0}")]
    ConstantNotSupported(String),

    #[error("no firmware install steps identified for component: {component}")]
    NoInstallSteps { component: String },
}

/// Outcome of step composition for one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    pub steps: Vec<StepName>,
    pub requires_host_power_off: bool,
    pub bmc_reset_post_install: bool,
    pub bmc_reset_on_install_failure: bool,
}

/// Compose the ordered steps for one component.
///
/// `power_cycle_bmc` requests a BMC reset before the install. `first` marks
/// the first action of the task: the host is powered off once for the whole
/// task, so later actions keep it off without planning the step again.
/// In-band installs run inside the host, so host power steps are never
/// planned for them.
pub fn compose_steps(
    method: InstallMethod,
    component: &str,
    requirements: &[String],
    power_cycle_bmc: bool,
    first: bool,
) -> Result<StepPlan, PlanError> {
    if requirements.is_empty() {
        return Err(PlanError::NoInstallSteps {
            component: component.to_string(),
        });
    }

    let parsed = requirements
        .iter()
        .map(|r| r.parse::<InstallRequirement>())
        .collect::<Result<Vec<_>, _>>()?;

    let requires_host_power_off = parsed.contains(&InstallRequirement::PowerOffHost);
    let out_of_band = method == InstallMethod::OutOfBand;

    let transfer: Vec<StepName> = parsed.iter().filter_map(|r| r.step_name()).collect();
    if transfer.is_empty() {
        return Err(PlanError::NoInstallSteps {
            component: component.to_string(),
        });
    }

    let mut steps = Vec::with_capacity(transfer.len() + 5);

    // Powering the host on only to power it off again is pointless
    if out_of_band && !requires_host_power_off {
        steps.push(StepName::PowerOnServer);
    }

    steps.push(StepName::CheckInstalledFirmware);
    steps.push(StepName::DownloadFirmware);

    if power_cycle_bmc {
        steps.push(StepName::PreInstallResetBmc);
    }

    if out_of_band && requires_host_power_off && first {
        steps.push(StepName::PowerOffServer);
    }

    steps.extend(transfer);

    Ok(StepPlan {
        steps,
        requires_host_power_off,
        bmc_reset_post_install: parsed.contains(&InstallRequirement::ResetBmcPostInstall),
        bmc_reset_on_install_failure: parsed
            .contains(&InstallRequirement::ResetBmcOnInstallFailure),
    })
}

/// Task level inputs to planning one action
#[derive(Debug, Clone)]
pub struct ActionParams {
    pub task_id: Uuid,
    pub method: InstallMethod,
    /// Position of this action in the task
    pub index: usize,
    /// Number of actions in the task
    pub count: usize,
    pub force_install: bool,
    pub reset_bmc_before_install: bool,
}

/// Plan the action installing `firmware`, steps are left without handlers
pub fn plan_action(
    params: &ActionParams,
    firmware: Firmware,
    requirements: &[String],
) -> Result<Action, PlanError> {
    let first = params.index == 0;
    let last = params.index + 1 == params.count;
    let bmc_reset_pre_install = first && params.reset_bmc_before_install;

    let plan = compose_steps(
        params.method,
        &firmware.component,
        requirements,
        bmc_reset_pre_install,
        first,
    )?;

    Ok(Action {
        id: action_id(params.task_id, &firmware.component, params.index),
        task_id: params.task_id,
        state: State::Pending,
        attempts: 0,
        force_install: params.force_install,
        bmc_reset_pre_install,
        bmc_reset_post_install: plan.bmc_reset_post_install,
        bmc_reset_on_install_failure: plan.bmc_reset_on_install_failure,
        host_power_off_pre_install: plan.requires_host_power_off && first,
        first,
        last,
        steps: plan.steps.into_iter().map(Step::pending).collect(),
        firmware,
    })
}
