//! Task consumer worker
//!
//! Polls the task queue, decides per request whether this worker may take
//! it, and dispatches accepted tasks through the concurrency limiter.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use condition_types::{StatusValue, TaskRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::TaskError;
use crate::limiter::{ConcurrencyLimiter, LimiterError};
use crate::models::task::Task;
use crate::models::worker::WorkerIdentity;
use crate::outofband::{Collaborators, HandlerOptions, OutOfBandHandler};
use crate::queue::TaskQueue;
use crate::runner::run_task;
use crate::status::{OrphanDetector, StatusPublisher, TaskStatus};
use crate::store::{KvEntry, StatusKv};

/// Task consumer options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// What the consumer needs to pick up and run tasks
pub struct Consumer {
    pub worker: WorkerIdentity,
    pub queue: Arc<dyn TaskQueue>,
    pub kv: Arc<dyn StatusKv>,
    pub detector: Arc<OrphanDetector>,
    pub limiter: Arc<ConcurrencyLimiter>,
    pub collaborators: Collaborators,
    pub handler_options: HandlerOptions,
    /// Cancels every running task
    pub cancel: CancellationToken,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Consumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker: WorkerIdentity,
        queue: Arc<dyn TaskQueue>,
        kv: Arc<dyn StatusKv>,
        detector: Arc<OrphanDetector>,
        limiter: Arc<ConcurrencyLimiter>,
        collaborators: Collaborators,
        handler_options: HandlerOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            worker,
            queue,
            kv,
            detector,
            limiter,
            collaborators,
            handler_options,
            cancel,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Ids of tasks dispatched by this consumer and still running
    pub fn in_flight(&self) -> Vec<Uuid> {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    fn is_in_flight(&self, id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
    }
}

/// Removes a task from the in-flight set when its job ends or is rejected
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl InFlightGuard {
    fn new(set: Arc<Mutex<HashSet<Uuid>>>, id: Uuid) -> Self {
        set.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
        Self { set, id }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Run the task consumer
pub async fn run<S, F>(
    options: &Options,
    consumer: Arc<Consumer>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(worker = %consumer.worker, "Task consumer starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Task consumer shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        match poll_once(&consumer).await {
            Ok(0) => debug!("No tasks accepted"),
            Ok(n) => info!("Accepted {} tasks", n),
            Err(e) => error!("Failed to poll task queue: {}", e),
        }
    }
}

/// Fetch pending requests and dispatch the ones this worker may run.
/// Returns the number of tasks dispatched.
pub async fn poll_once(consumer: &Arc<Consumer>) -> Result<usize, crate::errors::FlasherError> {
    let free = consumer
        .limiter
        .limit()
        .saturating_sub(consumer.limiter.active_count());
    if free == 0 {
        debug!("Concurrency limit reached, skipping poll");
        return Ok(0);
    }

    // Running tasks stay queued until acked, fetch past them
    let fetch_limit = free + consumer.in_flight().len();
    let requests = consumer.queue.fetch(fetch_limit).await?;
    let mut dispatched = 0;

    for request in requests {
        if consumer.is_in_flight(request.id) {
            continue;
        }

        let Some((task, publisher)) = accept(consumer, request).await else {
            continue;
        };

        let id = task.id;
        let guard = InFlightGuard::new(consumer.in_flight.clone(), id);
        let job_consumer = consumer.clone();
        let job = async move {
            let _guard = guard;
            run_one(job_consumer, task, publisher).await;
        };

        match consumer.limiter.dispatch(job).await {
            Ok(()) => {
                info!(task_id = %id, "Task dispatched");
                dispatched += 1;
            }
            Err(LimiterError::LimitReached) => {
                debug!(task_id = %id, "Concurrency limit reached, task left queued");
                break;
            }
            Err(e) => {
                warn!(task_id = %id, "Task not dispatched: {}", e);
                break;
            }
        }
    }

    Ok(dispatched)
}

/// Decide whether to run a request, and in which form
async fn accept(consumer: &Consumer, request: TaskRequest) -> Option<(Task, StatusPublisher)> {
    let (status, entry) = consumer.detector.inspect(request.id).await;

    match status {
        TaskStatus::NotStarted => Some((
            Task::from(request),
            StatusPublisher::new(consumer.kv.clone(), consumer.worker.clone()),
        )),
        TaskStatus::Orphaned => {
            let entry = entry?;
            match restore_task(&entry) {
                Ok(task) => {
                    info!(task_id = %task.id, state = %task.state, "Resuming orphaned task");
                    let publisher = StatusPublisher::new(consumer.kv.clone(), consumer.worker.clone())
                        .with_revision(entry.revision);
                    Some((task, publisher))
                }
                Err(e) => {
                    error!(task_id = %request.id, "Unable to restore orphaned task: {}", e);
                    None
                }
            }
        }
        TaskStatus::Complete => {
            debug!(task_id = %request.id, "Task already complete, acknowledging");
            if let Err(e) = consumer.queue.ack(request.id).await {
                warn!(task_id = %request.id, "Failed to acknowledge task: {}", e);
            }
            None
        }
        TaskStatus::InProgress | TaskStatus::Indeterminate => {
            debug!(task_id = %request.id, status = %status, "Task not accepted");
            None
        }
    }
}

/// Rebuild a task from its last published status
fn restore_task(entry: &KvEntry) -> Result<Task, serde_json::Error> {
    let value: StatusValue = serde_json::from_slice(&entry.value)?;
    serde_json::from_value(value.status)
}

async fn run_one(consumer: Arc<Consumer>, mut task: Task, publisher: StatusPublisher) {
    let mut handler = OutOfBandHandler::new(
        consumer.worker.clone(),
        consumer.collaborators.clone(),
        publisher,
        consumer.handler_options.clone(),
    );

    match run_task(&consumer.cancel, &mut task, &mut handler).await {
        Ok(()) => info!(task_id = %task.id, "Task complete"),
        Err(TaskError::Terminal(state)) => {
            debug!(task_id = %task.id, state = %state, "Task already terminal")
        }
        Err(e) => error!(task_id = %task.id, "Task failed: {}", e),
    }

    if task.state.is_terminal() {
        if let Err(e) = consumer.queue.ack(task.id).await {
            warn!(task_id = %task.id, "Failed to acknowledge task: {}", e);
        }
    }
}
