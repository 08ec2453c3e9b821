//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::app::options::AppOptions;
use crate::deploy::executor::{CommandExecutor, HookExecutor, ProcessHookRunner};
use crate::deploy::tracker::CommandTracker;
use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::workers::poller::{self, CommandPoller, RecoveryOutcome};
use crate::workers::pool::WorkerPool;

/// Run the Convoy agent
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing Convoy Agent...");

    if options.host_identifier.is_empty() {
        return Err(AgentError::ConfigError(
            "host_identifier is not configured".to_string(),
        ));
    }

    options.storage.layout.setup().await?;

    // Fails fast on a broken TLS or credentials configuration
    let client = Arc::new(HttpClient::new(options.control_plane.clone()).await?);
    debug!("Configured control plane client: {}", client.base_url());

    let executor: Arc<dyn CommandExecutor> =
        Arc::new(HookExecutor::new(Arc::new(ProcessHookRunner::new())));
    let tracker = CommandTracker::new(&options.storage.layout);
    let pool = Arc::new(WorkerPool::new(options.pool.clone()));

    let poller = Arc::new(CommandPoller::new(
        client,
        executor,
        tracker,
        pool.clone(),
        options.host_identifier.clone(),
    ));

    info!(
        "Initializing Host Agent: Host Identifier = {}",
        options.host_identifier
    );

    // Resolve any command interrupted by a previous crash before polling begins
    match poller.recover_from_crash().await {
        RecoveryOutcome::Recovered => {
            info!("Recovered an interrupted command from a previous run")
        }
        RecoveryOutcome::Clean => debug!("No interrupted command found"),
        RecoveryOutcome::Indeterminate => {
            warn!("Restart recovery failed, continuing startup")
        }
    }

    // Spawn the poller worker
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut poller_shutdown_rx = shutdown_tx.subscribe();
    let poller_options = options.poller.clone();
    let poller_handle = tokio::spawn({
        let poller = poller.clone();
        async move {
            poller::run(
                &poller_options,
                poller.as_ref(),
                |wait| tokio::time::sleep(wait),
                Box::pin(async move {
                    let _ = poller_shutdown_rx.recv().await;
                }),
            )
            .await;
        }
    });

    // Wait for shutdown
    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    let _ = shutdown_tx.send(());
    poller_handle
        .await
        .map_err(|e| AgentError::ShutdownError(e.to_string()))?;

    info!(
        "Gracefully shutting down agent worker tasks now, will wait up to {:?}",
        options.lifecycle.max_shutdown_delay
    );
    pool.shutdown(options.lifecycle.max_shutdown_delay).await;
    info!("All agent worker tasks have been shut down");

    Ok(())
}
