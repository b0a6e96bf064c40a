//! Liveness check-in worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::models::worker::WorkerIdentity;
use crate::store::{LivenessRegistry, StoreError};

/// Liveness worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Check-in interval, kept below the registry TTL
    pub checkin_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            checkin_interval: Duration::from_secs(30),
        }
    }
}

/// Register the worker, keep it checked in, and deregister on shutdown
pub async fn run<S, F>(
    options: &Options,
    registry: &dyn LivenessRegistry,
    worker: &WorkerIdentity,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(worker = %worker, "Liveness worker starting...");

    if let Err(e) = registry.register(worker).await {
        error!("Failed to register worker: {}", e);
    }

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Liveness worker shutting down...");
                if let Err(e) = registry.deregister(worker).await {
                    warn!("Failed to deregister worker: {}", e);
                }
                return;
            }
            _ = sleep_fn(options.checkin_interval) => {}
        }

        match registry.checkin(worker).await {
            Ok(()) => debug!("Liveness check-in"),
            Err(StoreError::NotFound(_)) => {
                // The registration expired, e.g. after a long pause
                warn!("Worker registration missing, registering again");
                if let Err(e) = registry.register(worker).await {
                    error!("Failed to register worker: {}", e);
                }
            }
            Err(e) => error!("Liveness check-in failed: {}", e),
        }
    }
}
