//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::device::DeviceFactory;
use crate::errors::FlasherError;
use crate::workers::{liveness, tasks};

/// Extra time granted after in-flight tasks are cancelled
const CANCEL_GRACE: Duration = Duration::from_secs(60);

/// Run the flasher worker until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    devices: Option<Arc<dyn DeviceFactory>>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), FlasherError> {
    info!("Initializing flasher...");

    // The consumer stops before the liveness worker so running tasks are
    // never seen as orphaned while this worker drains them
    let (consumer_shutdown_tx, _): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let (liveness_shutdown_tx, _): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(
        consumer_shutdown_tx.clone(),
        liveness_shutdown_tx.clone(),
        options.max_shutdown_delay,
    );

    if let Err(e) = init(
        &options,
        devices,
        &consumer_shutdown_tx,
        &liveness_shutdown_tx,
        &mut shutdown_manager,
    )
    .await
    {
        error!("Failed to start flasher: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(consumer_shutdown_tx);
    drop(liveness_shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    devices: Option<Arc<dyn DeviceFactory>>,
    consumer_shutdown_tx: &broadcast::Sender<()>,
    liveness_shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, FlasherError> {
    let app_state = Arc::new(AppState::init(options, devices).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    // Register before taking work
    init_liveness_worker(
        options.liveness_worker.clone(),
        app_state.clone(),
        shutdown_manager,
        liveness_shutdown_tx.subscribe(),
    )
    .await?;

    init_task_worker(
        options.task_worker.clone(),
        app_state.clone(),
        shutdown_manager,
        consumer_shutdown_tx.subscribe(),
    )
    .await?;

    Ok(app_state)
}

async fn init_liveness_worker(
    options: liveness::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), FlasherError> {
    info!("Initializing liveness worker...");

    let registry = app_state.registry.clone();
    let worker = app_state.worker.clone();

    let liveness_handle = tokio::spawn(async move {
        liveness::run(
            &options,
            registry.as_ref(),
            &worker,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_liveness_worker_handle(liveness_handle)?;
    Ok(())
}

async fn init_task_worker(
    options: tasks::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), FlasherError> {
    info!("Initializing task worker...");

    let consumer = app_state.consumer.clone();

    let task_handle = tokio::spawn(async move {
        tasks::run(
            &options,
            consumer,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_task_worker_handle(task_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    consumer_shutdown_tx: broadcast::Sender<()>,
    liveness_shutdown_tx: broadcast::Sender<()>,
    max_shutdown_delay: Duration,
    app_state: Option<Arc<AppState>>,
    task_worker_handle: Option<JoinHandle<()>>,
    liveness_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(
        consumer_shutdown_tx: broadcast::Sender<()>,
        liveness_shutdown_tx: broadcast::Sender<()>,
        max_shutdown_delay: Duration,
    ) -> Self {
        Self {
            consumer_shutdown_tx,
            liveness_shutdown_tx,
            max_shutdown_delay,
            app_state: None,
            task_worker_handle: None,
            liveness_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), FlasherError> {
        if self.app_state.is_some() {
            return Err(FlasherError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_task_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), FlasherError> {
        if self.task_worker_handle.is_some() {
            return Err(FlasherError::ShutdownError("task_worker_handle already set".to_string()));
        }
        self.task_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_liveness_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
    ) -> Result<(), FlasherError> {
        if self.liveness_worker_handle.is_some() {
            return Err(FlasherError::ShutdownError(
                "liveness_worker_handle already set".to_string(),
            ));
        }
        self.liveness_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), FlasherError> {
        let limit = self.max_shutdown_delay + CANCEL_GRACE;

        match tokio::time::timeout(limit, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!("Shutdown timed out after {:?}, forcing shutdown...", limit);
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), FlasherError> {
        info!("Shutting down flasher...");

        // 1. Stop taking new tasks
        let _ = self.consumer_shutdown_tx.send(());
        if let Some(handle) = self.task_worker_handle.take() {
            handle.await.map_err(|e| FlasherError::ShutdownError(e.to_string()))?;
        }

        // 2. Drain in-flight tasks, cancelling them once the delay runs out
        if let Some(app_state) = self.app_state.take() {
            let drained =
                tokio::time::timeout(self.max_shutdown_delay, app_state.limiter.stop_wait()).await;
            if drained.is_err() {
                warn!(
                    in_flight = app_state.limiter.active_count(),
                    "Tasks still running after {:?}, cancelling...", self.max_shutdown_delay
                );
                app_state.cancel.cancel();
                app_state.limiter.stop_wait().await;
            }
        }

        // 3. Deregister
        let _ = self.liveness_shutdown_tx.send(());
        if let Some(handle) = self.liveness_worker_handle.take() {
            handle.await.map_err(|e| FlasherError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesys::dir::Dir;
    use crate::storage::layout::StorageLayout;

    #[tokio::test]
    async fn test_run_dry_and_shutdown_deregisters() {
        let dir = Dir::create_temp_dir("flasher-run").await.unwrap();
        let options = AppOptions {
            layout: StorageLayout::new(dir.path()),
            dry_run: true,
            max_shutdown_delay: Duration::from_secs(5),
            ..Default::default()
        };

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(run(options.clone(), None, async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(());
        handle.await.unwrap().unwrap();

        assert!(options.layout.liveness_dir().list_files("json").await.unwrap().is_empty());

        dir.delete().await.unwrap();
    }
}
