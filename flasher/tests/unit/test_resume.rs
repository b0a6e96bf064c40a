//! Resuming interrupted tasks

use std::sync::Arc;
use std::time::Duration;

use condition_types::StatusValue;
use tokio_util::sync::CancellationToken;

use flasher::device::simulated::SimulatedDevice;
use flasher::errors::TaskError;
use flasher::limiter::ConcurrencyLimiter;
use flasher::models::state::{State, STEP_MAX_ATTEMPTS};
use flasher::models::step::StepName;
use flasher::models::task::Task;
use flasher::models::worker::WorkerIdentity;
use flasher::outofband::OutOfBandHandler;
use flasher::queue::MemoryQueue;
use flasher::runner::run_task;
use flasher::status::{status_key, OrphanDetector, StatusPublisher, TaskStatus};
use flasher::store::memory::{MemoryKv, MemoryLiveness};
use flasher::store::{LivenessRegistry, StatusKv};
use flasher::workers::tasks::{poll_once, Consumer};

use crate::helpers::{collaborators, component, firmware_spec, handler_options, request, worker, FACILITY};

fn device() -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::new(vec![
        component("bios", "1.0"),
        component("nic", "1.0"),
    ]))
}

fn handler(device: Arc<SimulatedDevice>) -> OutOfBandHandler {
    OutOfBandHandler::new(
        worker(),
        collaborators(device),
        StatusPublisher::new(Arc::new(MemoryKv::new()), worker()),
        handler_options(),
    )
}

/// A task that installed bios and was interrupted while polling the nic install
async fn interrupted_task() -> Task {
    let mut task = Task::from(request(vec![
        firmware_spec("bios", "1.1"),
        firmware_spec("nic", "1.1"),
    ]));
    run_task(&CancellationToken::new(), &mut task, &mut handler(device()))
        .await
        .unwrap();

    task.set_state(State::Active);
    let nic = &mut task.actions_planned[1];
    nic.state = State::Active;
    let poll = nic
        .steps
        .iter_mut()
        .find(|s| s.name == StepName::PollInstallStatus)
        .unwrap();
    poll.state = State::Active;

    // Handlers do not survive persistence
    let json = serde_json::to_vec(&task).unwrap();
    serde_json::from_slice(&json).unwrap()
}

#[tokio::test]
async fn test_resume_runs_only_unfinished_steps() {
    let mut task = interrupted_task().await;
    assert!(task.actions_planned[1].steps.iter().all(|s| s.handler.is_none()));

    let device = device();
    run_task(&CancellationToken::new(), &mut task, &mut handler(device.clone()))
        .await
        .unwrap();

    assert_eq!(task.state, State::Succeeded);
    assert_eq!(task.actions_planned[0].attempts, 1);
    assert_eq!(task.actions_planned[1].attempts, 2);

    let calls = device.calls();
    // Planning was not repeated and nothing was installed again
    assert!(!calls.iter().any(|c| c.starts_with("install_steps:")));
    assert!(!calls.iter().any(|c| c.starts_with("upload_and_initiate:")));
    assert!(calls.contains(&"task_status:install:nic".to_string()));
    assert!(!calls.contains(&"task_status:install:bios".to_string()));
}

#[tokio::test]
async fn test_exhausted_step_fails_task() {
    let mut task = interrupted_task().await;
    let poll = task.actions_planned[1]
        .steps
        .iter_mut()
        .find(|s| s.name == StepName::PollInstallStatus)
        .unwrap();
    poll.attempts = STEP_MAX_ATTEMPTS + 1;

    let result = run_task(&CancellationToken::new(), &mut task, &mut handler(device())).await;

    match result {
        Err(TaskError::Action { component, source }) => {
            assert_eq!(component, "nic");
            assert!(matches!(*source, TaskError::MaxAttempts { .. }));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(task.state, State::Failed);
    assert_eq!(task.actions_planned[1].state, State::Failed);
    assert!(task.info.contains("maximum attempts"));
}

#[tokio::test]
async fn test_consumer_resumes_orphaned_task() {
    let kv = Arc::new(MemoryKv::new());
    let registry = Arc::new(MemoryLiveness::new(Duration::from_secs(60)));
    let queue = Arc::new(MemoryQueue::new());

    // Published by a worker that is no longer registered
    let task = interrupted_task().await;
    let dead = WorkerIdentity::new("flasher-dead", FACILITY);
    let mut publisher = StatusPublisher::new(kv.clone(), dead);
    publisher.try_publish(&task).await.unwrap();

    let mut req = request(Vec::new());
    req.id = task.id;
    req.parameters = task.parameters.clone();
    queue.push(req);

    let detector = Arc::new(OrphanDetector::new(kv.clone(), registry.clone(), FACILITY));
    assert_eq!(detector.classify(task.id).await, TaskStatus::Orphaned);

    let me = worker();
    registry.register(&me).await.unwrap();
    let limiter = Arc::new(ConcurrencyLimiter::new(2, Duration::from_millis(5)));
    let device = device();
    let consumer = Arc::new(Consumer::new(
        me.clone(),
        queue.clone(),
        kv.clone(),
        detector.clone(),
        limiter.clone(),
        collaborators(device.clone()),
        handler_options(),
        CancellationToken::new(),
    ));

    assert_eq!(poll_once(&consumer).await.unwrap(), 1);
    limiter.stop_wait().await;

    assert!(queue.is_empty());
    assert!(consumer.in_flight().is_empty());
    assert!(!device.calls().iter().any(|c| c.starts_with("upload_and_initiate:")));

    let entry = kv.get(&status_key(FACILITY, task.id)).await.unwrap().unwrap();
    let value: StatusValue = serde_json::from_slice(&entry.value).unwrap();
    assert_eq!(value.state, State::Succeeded);
    assert_eq!(value.worker_id, me.id.to_string());
    assert_eq!(detector.classify(task.id).await, TaskStatus::Complete);
}

#[tokio::test]
async fn test_consumer_leaves_live_workers_tasks_alone() {
    let kv = Arc::new(MemoryKv::new());
    let registry = Arc::new(MemoryLiveness::new(Duration::from_secs(60)));
    let queue = Arc::new(MemoryQueue::new());

    let task = interrupted_task().await;
    let other = WorkerIdentity::new("flasher-other", FACILITY);
    registry.register(&other).await.unwrap();
    StatusPublisher::new(kv.clone(), other)
        .try_publish(&task)
        .await
        .unwrap();

    let mut req = request(Vec::new());
    req.id = task.id;
    queue.push(req);

    let detector = Arc::new(OrphanDetector::new(kv.clone(), registry, FACILITY));
    let limiter = Arc::new(ConcurrencyLimiter::new(1, Duration::from_millis(5)));
    let consumer = Arc::new(Consumer::new(
        worker(),
        queue.clone(),
        kv,
        detector,
        limiter.clone(),
        collaborators(device()),
        handler_options(),
        CancellationToken::new(),
    ));

    assert_eq!(poll_once(&consumer).await.unwrap(), 0);
    assert_eq!(queue.len(), 1);
    limiter.stop_wait().await;
}
