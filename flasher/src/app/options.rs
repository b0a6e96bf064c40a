//! Application options

use std::time::Duration;

use secrecy::SecretString;

use crate::outofband::{HandlerOptions, PollOptions};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::utils::CooldownOptions;
use crate::workers::{liveness, tasks};

/// Inventory connection options
#[derive(Debug, Clone)]
pub struct InventoryOptions {
    pub base_url: String,
    pub token: Option<SecretString>,
}

/// Application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Storage layout
    pub layout: StorageLayout,

    /// Facility this worker serves
    pub facility_code: String,

    /// Worker name registered for liveness
    pub worker_name: String,

    /// Maximum number of tasks run in parallel
    pub concurrency: usize,

    /// Run against the simulated device without downloading firmware
    pub dry_run: bool,

    /// Inventory connection
    pub inventory: InventoryOptions,

    /// A worker silent for this long is presumed dead
    pub liveness_ttl: Duration,

    /// Task consumer worker options
    pub task_worker: tasks::Options,

    /// Liveness worker options
    pub liveness_worker: liveness::Options,

    /// Options shared by every task handler
    pub handler: HandlerOptions,

    /// Timeout for a single firmware download
    pub download_timeout: Duration,

    /// Housekeeping interval of the concurrency limiter
    pub dispatch_tick: Duration,

    /// Time in-flight tasks get to finish on shutdown before they are cancelled
    pub max_shutdown_delay: Duration,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let layout = StorageLayout::new(&settings.base_dir);

        let handler = HandlerOptions {
            download_dir: layout.downloads_dir(),
            poll: PollOptions {
                backoff: CooldownOptions {
                    base_delay: Duration::from_secs(settings.bmc.poll_base_delay_secs),
                    max_delay: Duration::from_secs(settings.bmc.poll_max_delay_secs),
                    multiplier: 2.0,
                },
                max_wait: Duration::from_secs(settings.bmc.poll_max_wait_secs),
                max_errors: settings.bmc.poll_max_errors,
            },
            bmc_reset_settle: Duration::from_secs(settings.bmc.reset_settle_secs),
            host_power_cycle: settings.host_power_cycle,
        };

        Self {
            layout,
            facility_code: settings.facility_code.clone(),
            worker_name: settings.worker_name.clone(),
            concurrency: settings.concurrency.max(1),
            dry_run: settings.dry_run,
            inventory: InventoryOptions {
                base_url: settings.inventory.base_url.clone(),
                token: settings
                    .inventory
                    .token
                    .clone()
                    .map(SecretString::from),
            },
            liveness_ttl: Duration::from_secs(settings.liveness.ttl_secs),
            task_worker: tasks::Options {
                interval: Duration::from_secs(settings.task_poll_interval_secs),
            },
            liveness_worker: liveness::Options {
                checkin_interval: Duration::from_secs(settings.liveness.checkin_interval_secs),
            },
            handler,
            download_timeout: Duration::from_secs(30 * 60),
            dispatch_tick: Duration::from_secs(1),
            max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}
