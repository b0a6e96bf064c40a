//! Flasher - Entry Point
//!
//! Out-of-band firmware install worker. Picks firmware install tasks from the
//! spool directory, installs firmware through the server BMC and publishes
//! progress to the status store.

use std::collections::HashMap;
use std::env;

use flasher::app::options::AppOptions;
use flasher::app::run::run;
use flasher::filesys::file::File;
use flasher::logs::{init_logging, LogOptions};
use flasher::storage::layout::StorageLayout;
use flasher::storage::settings::Settings;
use flasher::utils::version_info;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Unable to render version: {e}"),
        }
        return;
    }

    // Retrieve the settings file
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => StorageLayout::default().settings_file(),
    };
    let settings_found = settings_file.exists().await;
    let mut settings = if settings_found {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!(
                    "Unable to read settings file {}: {e}",
                    settings_file.path().display()
                );
                return;
            }
        }
    } else {
        Settings::default()
    };

    if cli_args.contains_key("dry-run") {
        settings.dry_run = true;
    }
    if let Some(base_dir) = cli_args.get("base-dir") {
        settings.base_dir = base_dir.clone();
    }

    let options = AppOptions::from_settings(&settings);

    // Initialize logging
    if let Err(e) = options.layout.logs_dir().create().await {
        eprintln!("Failed to create logs directory: {e}");
    }
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| options.layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    if !settings_found {
        warn!(
            "Settings file {} not found, using defaults",
            settings_file.path().display()
        );
    }

    info!(
        version = %version.version,
        git_hash = %version.git_hash,
        "Running flasher with options: {:?}",
        options
    );
    if let Err(e) = run(options, None, await_shutdown_signal()).await {
        error!("Failed to run the flasher: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Unable to install signal handlers, falling back to Ctrl+C: {e}");
                wait_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    wait_ctrl_c().await;
}

async fn wait_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
