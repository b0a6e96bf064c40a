//! Fault injection for exercising failure paths

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::TaskError;
use crate::models::task::Task;
use crate::runner::Phase;

/// Apply the task's fault, if any, before `phase` runs.
///
/// A configured delay is cleared once served so a retried task does not
/// sleep again.
pub async fn inject(
    ctx: &CancellationToken,
    task: &mut Task,
    phase: Phase,
) -> Result<(), TaskError> {
    let Some(fault) = task.fault.as_mut() else {
        return Ok(());
    };

    if fault.panic {
        panic!("fault injected: deliberate panic before phase {}", phase);
    }

    if let Some(delay) = fault.delay.take() {
        warn!(task_id = %task.id, "Fault injected: delaying phase {} by {:?}", phase, delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.cancelled() => return Err(TaskError::Cancelled),
        }
    }

    if fault.fail_at.as_deref() == Some(phase.as_str()) {
        warn!(task_id = %task.id, "Fault injected: failing phase {}", phase);
        return Err(TaskError::FaultInjected(phase.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use condition_types::{Fault, FirmwareInstallParameters};
    use std::time::Duration;
    use uuid::Uuid;

    fn task_with_fault(fault: Fault) -> Task {
        let mut task = Task::new(Uuid::new_v4(), FirmwareInstallParameters::default());
        task.fault = Some(fault);
        task
    }

    #[tokio::test]
    async fn test_no_fault_is_noop() {
        let ctx = CancellationToken::new();
        let mut task = Task::new(Uuid::new_v4(), FirmwareInstallParameters::default());
        assert!(inject(&ctx, &mut task, Phase::Query).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_at_named_phase_only() {
        let ctx = CancellationToken::new();
        let mut task = task_with_fault(Fault {
            fail_at: Some("PlanActions".to_string()),
            ..Default::default()
        });

        assert!(inject(&ctx, &mut task, Phase::Query).await.is_ok());
        assert!(matches!(
            inject(&ctx, &mut task, Phase::PlanActions).await,
            Err(TaskError::FaultInjected(phase)) if phase == "PlanActions"
        ));
    }

    #[tokio::test]
    async fn test_delay_fires_once() {
        let ctx = CancellationToken::new();
        let mut task = task_with_fault(Fault {
            delay: Some(Duration::from_millis(5)),
            ..Default::default()
        });

        inject(&ctx, &mut task, Phase::Initialize).await.unwrap();
        assert_eq!(task.fault.as_ref().and_then(|f| f.delay), None);
    }

    #[tokio::test]
    #[should_panic(expected = "deliberate panic")]
    async fn test_panic_fault() {
        let ctx = CancellationToken::new();
        let mut task = task_with_fault(Fault {
            panic: true,
            ..Default::default()
        });

        let _ = inject(&ctx, &mut task, Phase::Initialize).await;
    }
}
