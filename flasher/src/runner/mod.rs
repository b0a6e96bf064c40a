//! Task runner
//!
//! Drives one task through its phases, Initialize, Query, PlanActions and
//! RunActions, publishing status after every phase. The phase functions come
//! from a [`TaskHandler`]; the runner owns the state transitions, fault
//! injection and the success/failure close-out.

pub mod executor;
pub mod fault;

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::TaskError;
use crate::models::state::State;
use crate::models::task::Task;

pub use executor::{run_actions, ActionOutcome, HostPowerCyclePolicy};

/// Task phases, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Query,
    PlanActions,
    RunActions,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Initialize,
        Phase::Query,
        Phase::PlanActions,
        Phase::RunActions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialize => "Initialize",
            Phase::Query => "Query",
            Phase::PlanActions => "PlanActions",
            Phase::RunActions => "RunActions",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities the runner needs from whoever handles a task.
///
/// The `after_action`, `action_failed` and `power_cycle_host` hooks are
/// called by [`run_actions`].
#[async_trait]
pub trait TaskHandler: Send {
    async fn initialize(&mut self, ctx: &CancellationToken, task: &mut Task)
        -> Result<(), TaskError>;

    async fn query(&mut self, ctx: &CancellationToken, task: &mut Task) -> Result<(), TaskError>;

    async fn plan_actions(
        &mut self,
        ctx: &CancellationToken,
        task: &mut Task,
    ) -> Result<(), TaskError>;

    async fn run_actions(
        &mut self,
        ctx: &CancellationToken,
        task: &mut Task,
    ) -> Result<(), TaskError>;

    async fn on_success(&mut self, ctx: &CancellationToken, task: &mut Task);

    async fn on_failure(&mut self, ctx: &CancellationToken, task: &mut Task);

    /// Persist the current task status
    async fn publish(&mut self, task: &Task);

    /// Called once an action succeeded
    async fn after_action(
        &mut self,
        _ctx: &CancellationToken,
        _task: &mut Task,
        _action_index: usize,
        _outcome: ActionOutcome,
    ) -> Result<(), TaskError> {
        Ok(())
    }

    /// Called once an action failed, before the error propagates
    async fn action_failed(&mut self, _ctx: &CancellationToken, _task: &mut Task, _action_index: usize) {}

    /// Power cycle the host so a pending install can complete
    async fn power_cycle_host(&mut self, _ctx: &CancellationToken) -> Result<(), TaskError> {
        Err(TaskError::Device(crate::device::DeviceError::Unsupported(
            "host power cycle".to_string(),
        )))
    }
}

/// Run a task to completion.
///
/// The task ends Succeeded or Failed. A task already in a terminal state is
/// left untouched and rejected.
pub async fn run_task<H>(
    ctx: &CancellationToken,
    task: &mut Task,
    handler: &mut H,
) -> Result<(), TaskError>
where
    H: TaskHandler + ?Sized,
{
    if task.state.is_terminal() {
        return Err(TaskError::Terminal(task.state));
    }

    info!(task_id = %task.id, asset_id = %task.asset_id(), "Running task");
    task.set_state(State::Active);
    task.append_status("task active");
    handler.publish(task).await;

    for phase in Phase::ALL {
        if let Err(e) = run_phase(ctx, task, handler, phase).await {
            return Err(fail(ctx, task, handler, phase, e).await);
        }
        handler.publish(task).await;
    }

    task.set_state(State::Succeeded);
    task.append_status("task succeeded");
    handler.on_success(ctx, task).await;
    handler.publish(task).await;

    info!(task_id = %task.id, "Task succeeded");
    Ok(())
}

async fn run_phase<H>(
    ctx: &CancellationToken,
    task: &mut Task,
    handler: &mut H,
    phase: Phase,
) -> Result<(), TaskError>
where
    H: TaskHandler + ?Sized,
{
    if ctx.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    fault::inject(ctx, task, phase).await?;

    match phase {
        Phase::Initialize => handler.initialize(ctx, task).await,
        Phase::Query => handler.query(ctx, task).await,
        Phase::PlanActions => handler.plan_actions(ctx, task).await,
        Phase::RunActions => handler.run_actions(ctx, task).await,
    }
}

async fn fail<H>(
    ctx: &CancellationToken,
    task: &mut Task,
    handler: &mut H,
    phase: Phase,
    err: TaskError,
) -> TaskError
where
    H: TaskHandler + ?Sized,
{
    error!(task_id = %task.id, phase = %phase, "Task failed: {}", err);

    task.set_state(State::Failed);
    task.info = err.to_string();
    task.append_status(format!("task failed at {}: {}", phase, err));
    handler.on_failure(ctx, task).await;
    handler.publish(task).await;

    err
}
