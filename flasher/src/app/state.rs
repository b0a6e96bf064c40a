//! Application state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::device::simulated::{SimulatedDevice, SimulatedDeviceFactory};
use crate::device::DeviceFactory;
use crate::errors::FlasherError;
use crate::firmware::http::HttpFetcher;
use crate::firmware::{FirmwareFetcher, NoopFetcher};
use crate::inventory::fleetdb::FleetDbClient;
use crate::inventory::memory::MemoryInventory;
use crate::inventory::Inventory;
use crate::limiter::ConcurrencyLimiter;
use crate::models::worker::WorkerIdentity;
use crate::outofband::Collaborators;
use crate::queue::{SpoolQueue, TaskQueue};
use crate::status::OrphanDetector;
use crate::store::file::{FileKv, FileLiveness};
use crate::store::{LivenessRegistry, StatusKv};
use crate::workers::tasks::Consumer;

/// Application state shared by the workers
pub struct AppState {
    pub worker: WorkerIdentity,
    pub kv: Arc<dyn StatusKv>,
    pub registry: Arc<dyn LivenessRegistry>,
    pub queue: Arc<dyn TaskQueue>,
    pub limiter: Arc<ConcurrencyLimiter>,
    pub consumer: Arc<Consumer>,
    /// Cancels every in-flight task
    pub cancel: CancellationToken,
}

impl AppState {
    /// Build the state from options.
    ///
    /// `devices` supplies BMC sessions. Without one the worker only runs in
    /// dry run mode against the simulated device.
    pub async fn init(
        options: &AppOptions,
        devices: Option<Arc<dyn DeviceFactory>>,
    ) -> Result<Self, FlasherError> {
        options.layout.setup().await?;

        let worker = WorkerIdentity::new(&options.worker_name, &options.facility_code);
        info!(worker = %worker, dry_run = options.dry_run, "Worker identity");

        let kv: Arc<dyn StatusKv> = Arc::new(FileKv::new(options.layout.status_dir()));
        let registry: Arc<dyn LivenessRegistry> = Arc::new(FileLiveness::new(
            options.layout.liveness_dir(),
            options.liveness_ttl,
        ));
        let queue: Arc<dyn TaskQueue> = Arc::new(SpoolQueue::new(options.layout.tasks_dir()));

        let collaborators = init_collaborators(options, devices)?;

        let limiter = Arc::new(ConcurrencyLimiter::new(
            options.concurrency,
            options.dispatch_tick,
        ));
        let detector = Arc::new(OrphanDetector::new(
            kv.clone(),
            registry.clone(),
            &options.facility_code,
        ));
        let cancel = CancellationToken::new();

        let consumer = Arc::new(Consumer::new(
            worker.clone(),
            queue.clone(),
            kv.clone(),
            detector,
            limiter.clone(),
            collaborators,
            options.handler.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            worker,
            kv,
            registry,
            queue,
            limiter,
            consumer,
            cancel,
        })
    }
}

fn init_collaborators(
    options: &AppOptions,
    devices: Option<Arc<dyn DeviceFactory>>,
) -> Result<Collaborators, FlasherError> {
    if options.dry_run {
        warn!("Dry run: using the simulated device, firmware is not downloaded");
        let devices: Arc<dyn DeviceFactory> = match devices {
            Some(devices) => devices,
            None => Arc::new(SimulatedDeviceFactory::new(Arc::new(
                SimulatedDevice::dry_run(),
            ))),
        };

        let inventory: Arc<dyn Inventory> = Arc::new(MemoryInventory::new());
        let fetcher: Arc<dyn FirmwareFetcher> = Arc::new(NoopFetcher);
        return Ok(Collaborators {
            inventory,
            devices,
            fetcher,
        });
    }

    let Some(devices) = devices else {
        return Err(FlasherError::ConfigError(
            "no BMC driver configured, enable dry_run to use the simulated device".to_string(),
        ));
    };

    let inventory: Arc<dyn Inventory> = Arc::new(FleetDbClient::new(
        &options.inventory.base_url,
        options.inventory.token.clone(),
    )?);
    let fetcher: Arc<dyn FirmwareFetcher> = Arc::new(
        HttpFetcher::new(options.download_timeout)
            .map_err(|e| FlasherError::ConfigError(e.to_string()))?,
    );

    Ok(Collaborators {
        inventory,
        devices,
        fetcher,
    })
}
