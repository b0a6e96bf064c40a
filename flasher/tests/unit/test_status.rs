//! Status publishing and orphan detection tests

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use condition_types::StatusValue;

use flasher::models::state::State;
use flasher::models::task::Task;
use flasher::models::worker::WorkerIdentity;
use flasher::status::{status_key, OrphanDetector, StatusPublisher, TaskStatus};
use flasher::store::memory::{MemoryKv, MemoryLiveness};
use flasher::store::{worker_key, LivenessRegistry, StatusKv, StoreError};

use crate::helpers::{firmware_spec, request, worker, FACILITY};

fn task() -> Task {
    Task::from(request(vec![firmware_spec("bios", "1.1")]))
}

async fn stored(kv: &MemoryKv, task: &Task) -> (StatusValue, u64) {
    let entry = kv.get(&status_key(FACILITY, task.id)).await.unwrap().unwrap();
    (serde_json::from_slice(&entry.value).unwrap(), entry.revision)
}

#[tokio::test]
async fn test_create_then_cas_update() {
    let kv = Arc::new(MemoryKv::new());
    let mut task = task();
    let mut publisher = StatusPublisher::new(kv.clone(), worker());

    let first = publisher.try_publish(&task).await.unwrap();
    task.set_state(State::Active);
    let second = publisher.try_publish(&task).await.unwrap();

    assert!(second > first);
    assert_eq!(publisher.revision(), Some(second));

    let (value, revision) = stored(&kv, &task).await;
    assert_eq!(revision, second);
    assert_eq!(value.state, State::Active);
    assert_eq!(value.msg_version, condition_types::STATUS_VALUE_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_stale_revision_is_dropped() {
    let kv = Arc::new(MemoryKv::new());
    let mut task = task();
    let mut ours = StatusPublisher::new(kv.clone(), worker());
    let revision = ours.try_publish(&task).await.unwrap();

    // Another writer moves the entry on
    let mut theirs = StatusPublisher::new(kv.clone(), worker()).with_revision(revision);
    task.set_state(State::Failed);
    let theirs_revision = theirs.try_publish(&task).await.unwrap();

    task.set_state(State::Active);
    let err = ours.try_publish(&task).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(err, StoreError::RevisionMismatch { .. }));
    assert_eq!(ours.revision(), Some(revision));

    // publish swallows the conflict
    ours.publish(&task).await;

    let (value, stored_revision) = stored(&kv, &task).await;
    assert_eq!(stored_revision, theirs_revision);
    assert_eq!(value.state, State::Failed);
}

#[tokio::test]
async fn test_second_create_conflicts() {
    let kv = Arc::new(MemoryKv::new());
    let task = task();

    StatusPublisher::new(kv.clone(), worker())
        .try_publish(&task)
        .await
        .unwrap();
    let err = StatusPublisher::new(kv.clone(), worker())
        .try_publish(&task)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::KeyExists(_)));
}

#[tokio::test]
async fn test_orphan_detection() {
    let kv = Arc::new(MemoryKv::new());
    let registry = Arc::new(MemoryLiveness::new(Duration::from_secs(60)));
    let detector = OrphanDetector::new(kv.clone(), registry.clone(), FACILITY);

    let alive = WorkerIdentity::new("flasher-alive", FACILITY);
    let dead = WorkerIdentity::new("flasher-dead", FACILITY);
    registry.register(&alive).await.unwrap();
    registry.register(&dead).await.unwrap();
    registry.set_last_contact(
        &worker_key(&dead),
        Utc::now() - chrono::Duration::minutes(10),
    );

    // Never published
    let fresh = task();
    assert_eq!(detector.classify(fresh.id).await, TaskStatus::NotStarted);

    // Running on a live worker
    let mut running = task();
    running.set_state(State::Active);
    StatusPublisher::new(kv.clone(), alive.clone())
        .try_publish(&running)
        .await
        .unwrap();
    assert_eq!(detector.classify(running.id).await, TaskStatus::InProgress);

    // Running on a worker whose check-in expired
    let mut orphan = task();
    orphan.set_state(State::Active);
    StatusPublisher::new(kv.clone(), dead.clone())
        .try_publish(&orphan)
        .await
        .unwrap();
    assert_eq!(detector.classify(orphan.id).await, TaskStatus::Orphaned);

    // Terminal, whoever wrote it
    let mut finished = task();
    finished.set_state(State::Succeeded);
    StatusPublisher::new(kv.clone(), dead)
        .try_publish(&finished)
        .await
        .unwrap();
    assert_eq!(detector.classify(finished.id).await, TaskStatus::Complete);
}

#[tokio::test]
async fn test_unreadable_status_is_indeterminate() {
    let kv = Arc::new(MemoryKv::new());
    let registry = Arc::new(MemoryLiveness::new(Duration::from_secs(60)));
    let detector = OrphanDetector::new(kv.clone(), registry, FACILITY);

    let task = task();
    kv.put(&status_key(FACILITY, task.id), b"not json".to_vec());

    assert_eq!(detector.classify(task.id).await, TaskStatus::Indeterminate);
}
