//! Concurrency limiter
//!
//! Bounds how many dispatched jobs run at once. All accounting happens in a
//! single dispatch loop fed by two channels, one of dispatch requests and one
//! of completions, so the in-flight count needs no lock. A periodic tick lets
//! the loop notice a drain request while idle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

/// Limiter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    #[error("concurrency limit reached")]
    LimitReached,

    #[error("draining")]
    Draining,

    #[error("dispatcher stopped")]
    Stopped,
}

struct DispatchRequest {
    job: BoxFuture<'static, ()>,
    reply: oneshot::Sender<Result<(), LimiterError>>,
}

/// Reports a job's completion to the dispatch loop, also when the job panics
struct CompletionGuard(mpsc::UnboundedSender<()>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

pub struct ConcurrencyLimiter {
    limit: usize,
    requests: mpsc::Sender<DispatchRequest>,
    draining: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    stopped: watch::Receiver<bool>,
}

impl ConcurrencyLimiter {
    /// Create a limiter and start its dispatch loop on the current runtime
    pub fn new(limit: usize, tick: Duration) -> Self {
        let (requests, rx) = mpsc::channel(limit.max(1));
        let (stopped_tx, stopped) = watch::channel(false);
        let draining = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(0));

        tokio::spawn(dispatch_loop(
            limit,
            rx,
            draining.clone(),
            active.clone(),
            stopped_tx,
            tick,
        ));

        Self {
            limit,
            requests,
            draining,
            active,
            stopped,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `job` if a slot is free.
    ///
    /// Never waits for a slot: a full limiter rejects with
    /// [`LimiterError::LimitReached`], a draining one with
    /// [`LimiterError::Draining`].
    pub async fn dispatch<F>(&self, job: F) -> Result<(), LimiterError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_draining() {
            return Err(LimiterError::Draining);
        }

        let (reply, rx) = oneshot::channel();
        self.requests
            .send(DispatchRequest {
                job: job.boxed(),
                reply,
            })
            .await
            .map_err(|_| LimiterError::Stopped)?;

        rx.await.map_err(|_| LimiterError::Stopped)?
    }

    /// Jobs currently running
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and wait for the running ones to finish
    pub async fn stop_wait(&self) {
        self.draining.store(true, Ordering::SeqCst);
        info!(active = self.active_count(), "Draining dispatcher");

        let mut stopped = self.stopped.clone();
        // An error means the loop already exited
        let _ = stopped.wait_for(|done| *done).await;
    }
}

async fn dispatch_loop(
    limit: usize,
    mut requests: mpsc::Receiver<DispatchRequest>,
    draining: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    stopped: watch::Sender<bool>,
    tick: Duration,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
    let mut ticker = tokio::time::interval(tick);
    let mut in_flight = 0usize;
    let mut requests_open = true;

    loop {
        tokio::select! {
            request = requests.recv(), if requests_open => match request {
                Some(request) => {
                    let result = if draining.load(Ordering::SeqCst) {
                        Err(LimiterError::Draining)
                    } else if in_flight >= limit {
                        Err(LimiterError::LimitReached)
                    } else {
                        in_flight += 1;
                        active.store(in_flight, Ordering::SeqCst);

                        let guard = CompletionGuard(done_tx.clone());
                        tokio::spawn(async move {
                            let _guard = guard;
                            request.job.await;
                        });
                        Ok(())
                    };

                    let _ = request.reply.send(result);
                }
                None => {
                    requests_open = false;
                    draining.store(true, Ordering::SeqCst);
                }
            },
            Some(()) = done_rx.recv() => {
                in_flight = in_flight.saturating_sub(1);
                active.store(in_flight, Ordering::SeqCst);
                debug!(active = in_flight, "Job finished");
            }
            _ = ticker.tick() => {}
        }

        if draining.load(Ordering::SeqCst) && in_flight == 0 {
            break;
        }
    }

    debug!("Dispatch loop stopped");
    stopped.send_replace(true);
}
