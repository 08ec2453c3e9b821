//! Convoy Agent - Entry Point
//!
//! A host agent for fleet deployments. Polls the Convoy control plane for
//! lifecycle commands, runs them, and reports the results back.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use convoyd::app::options::{AppOptions, LifecycleOptions, StorageOptions};
use convoyd::app::run::run;
use convoyd::http::client::ClientOptions;
use convoyd::logs::{init_logging, LogOptions};
use convoyd::storage::layout::StorageLayout;
use convoyd::storage::settings::Settings;
use convoyd::workers::poller;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        println!("convoyd {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    // Retrieve the settings file
    let layout = match cli_args.get("storage-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };
    let settings_file = layout.settings_file();
    let settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {e}");
                return;
            }
        }
    } else {
        Settings::default()
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Resolve control plane credentials from the configured policy
    let token = match settings
        .credentials
        .resolve(settings.test_profile_active())
        .await
    {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to resolve control plane credentials: {e}");
            return;
        }
    };

    // Run the agent
    let options = AppOptions {
        lifecycle: LifecycleOptions {
            max_shutdown_delay: Duration::from_secs(settings.shutdown_wait_secs),
        },
        control_plane: ClientOptions {
            base_url: settings.control_plane.base_url.clone(),
            region: settings.control_plane.region.clone(),
            ssl_ca_path: settings.control_plane.ssl_ca_path.clone(),
            token,
        },
        host_identifier: settings.host_identifier.clone(),
        storage: StorageOptions { layout },
        poller: poller::Options {
            interval: Duration::from_secs(settings.poll_interval_secs),
        },
        ..Default::default()
    };

    info!("Running Convoy Agent");
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the agent: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

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
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
