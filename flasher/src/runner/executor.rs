//! Action and step execution
//!
//! Walks the planned actions in order and, inside each, the planned steps.
//! Units that already succeeded are skipped, interrupted ones are re-run
//! within their attempt budget.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{StepError, TaskError};
use crate::models::state::{Resumable, State};
use crate::models::task::Task;
use crate::runner::TaskHandler;

/// How an action that succeeded got there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Every step ran
    Installed,
    /// The requested firmware was already installed
    Skipped,
}

/// What to do when a device reports the install needs a host power cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum HostPowerCyclePolicy {
    /// Fail the task
    #[default]
    Fail,
    /// Power cycle the host and resume, at most `max_cycles` times per task
    PowerCycle { max_cycles: u32 },
}

impl HostPowerCyclePolicy {
    pub fn allows(&self, cycles_performed: u32) -> bool {
        match self {
            HostPowerCyclePolicy::Fail => false,
            HostPowerCyclePolicy::PowerCycle { max_cycles } => cycles_performed < *max_cycles,
        }
    }
}

/// Run every planned action of the task in order
pub async fn run_actions<H>(
    ctx: &CancellationToken,
    task: &mut Task,
    handler: &mut H,
    policy: HostPowerCyclePolicy,
) -> Result<(), TaskError>
where
    H: TaskHandler + ?Sized,
{
    for idx in 0..task.actions_planned.len() {
        loop {
            match run_action(ctx, task, handler, idx).await {
                Ok(()) => break,
                Err(TaskError::HostPowerCycleRequired { component })
                    if policy.allows(task.data.host_power_cycles) =>
                {
                    task.data.host_power_cycles += 1;
                    warn!(
                        task_id = %task.id,
                        cycles = task.data.host_power_cycles,
                        "Power cycling host to complete {} install", component
                    );
                    task.append_status(format!(
                        "power cycling host to complete {} firmware install",
                        component
                    ));
                    handler.publish(task).await;
                    handler.power_cycle_host(ctx).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}

async fn run_action<H>(
    ctx: &CancellationToken,
    task: &mut Task,
    handler: &mut H,
    idx: usize,
) -> Result<(), TaskError>
where
    H: TaskHandler + ?Sized,
{
    if ctx.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let action = &mut task.actions_planned[idx];
    let component = action.component().to_string();
    let version = action.firmware.version.clone();

    match action.should_resume() {
        Ok(false) => {
            debug!(action_id = %action.id, "Action already succeeded, skipping");
            return Ok(());
        }
        Ok(true) => {}
        Err(exhausted) => {
            action.state = State::Failed;
            let err = TaskError::MaxAttempts {
                unit: format!("action {}", action.id),
                attempts: exhausted.attempts,
            };
            task.append_status(format!("{} install failed: {}", component, err));
            return Err(wrap(component, err));
        }
    }

    action.state = State::Active;
    action.attempts += 1;
    info!(
        action_id = %action.id,
        attempt = action.attempts,
        "Installing {} firmware {}", component, version
    );
    task.append_status(format!("installing {} firmware {}", component, version));
    handler.publish(task).await;

    match run_action_steps(ctx, task, handler, idx).await {
        Ok(outcome) => {
            task.actions_planned[idx].state = State::Succeeded;
            let msg = match outcome {
                ActionOutcome::Installed => {
                    format!("installed {} firmware {}", component, version)
                }
                ActionOutcome::Skipped => format!(
                    "{} firmware {} already installed, skipped",
                    component, version
                ),
            };
            task.append_status(msg);
            handler.publish(task).await;

            handler
                .after_action(ctx, task, idx, outcome)
                .await
                .map_err(|e| wrap(component, e))
        }
        Err(e) if e.is_passthrough() => Err(e),
        Err(e) => {
            task.actions_planned[idx].state = State::Failed;
            task.append_status(format!("{} install failed: {}", component, e));
            handler.action_failed(ctx, task, idx).await;
            handler.publish(task).await;

            Err(wrap(component, e))
        }
    }
}

async fn run_action_steps<H>(
    ctx: &CancellationToken,
    task: &mut Task,
    handler: &mut H,
    idx: usize,
) -> Result<ActionOutcome, TaskError>
where
    H: TaskHandler + ?Sized,
{
    let component = task.actions_planned[idx].component().to_string();

    for s in 0..task.actions_planned[idx].steps.len() {
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let step = &mut task.actions_planned[idx].steps[s];
        let name = step.name;

        match step.should_resume() {
            Ok(false) => continue,
            Ok(true) => {}
            Err(exhausted) => {
                step.state = State::Failed;
                return Err(TaskError::MaxAttempts {
                    unit: format!("step {}", name),
                    attempts: exhausted.attempts,
                });
            }
        }

        let Some(step_fn) = step.handler.clone() else {
            return Err(TaskError::NilHandler { step: name });
        };

        step.state = State::Active;
        step.attempts += 1;
        debug!(component = %component, step = %name, attempt = step.attempts, "Running step");
        handler.publish(task).await;

        let result = tokio::select! {
            res = step_fn(ctx.clone()) => res,
            _ = ctx.cancelled() => Err(StepError::Cancelled),
        };

        let step = &mut task.actions_planned[idx].steps[s];
        match result {
            Ok(()) => step.state = State::Succeeded,
            Err(StepError::InstalledFirmwareEqual) => {
                step.state = State::Succeeded;
                info!(component = %component, "Installed firmware equals requested version");
                return Ok(ActionOutcome::Skipped);
            }
            // Left active so the step runs again once the host was cycled
            Err(StepError::HostPowerCycleRequired) => {
                return Err(TaskError::HostPowerCycleRequired { component });
            }
            Err(StepError::Cancelled) => return Err(TaskError::Cancelled),
            Err(source) => {
                step.state = State::Failed;
                return Err(TaskError::Step {
                    step: name,
                    component,
                    source,
                });
            }
        }
    }

    Ok(ActionOutcome::Installed)
}

fn wrap(component: String, err: TaskError) -> TaskError {
    TaskError::Action {
        component,
        source: Box::new(err),
    }
}
