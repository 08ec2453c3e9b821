//! Polling worker for host commands

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::deploy::executor::CommandExecutor;
use crate::deploy::lifecycle::CommandLifecycle;
use crate::deploy::tracker::CommandTracker;
use crate::errors::AgentError;
use crate::http::commands::ControlPlaneApi;
use crate::models::command::{CompletionStatus, HostCommand};
use crate::models::diagnostics::Diagnostics;
use crate::workers::pool::WorkerPool;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Outcome of the startup crash-recovery check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// An interrupted command was found, failed, and cleaned up
    Recovered,

    /// No interrupted command was found
    Clean,

    /// The recovery attempt itself failed; the agent starts anyway
    Indeterminate,
}

/// Polls the control plane and hands received commands to the worker pool
pub struct CommandPoller {
    client: Arc<dyn ControlPlaneApi>,
    lifecycle: Arc<CommandLifecycle>,
    tracker: CommandTracker,
    pool: Arc<WorkerPool>,
    host_identifier: String,
}

impl CommandPoller {
    pub fn new(
        client: Arc<dyn ControlPlaneApi>,
        executor: Arc<dyn CommandExecutor>,
        tracker: CommandTracker,
        pool: Arc<WorkerPool>,
        host_identifier: String,
    ) -> Self {
        let lifecycle = Arc::new(CommandLifecycle::new(
            client.clone(),
            executor,
            tracker.clone(),
            host_identifier.clone(),
        ));
        Self {
            client,
            lifecycle,
            tracker,
            pool,
            host_identifier,
        }
    }

    /// Resolve a command interrupted by a crash, before any polling starts.
    ///
    /// Failure here is logged and ignored; recovery must never prevent the
    /// agent from starting.
    pub async fn recover_from_crash(&self) -> RecoveryOutcome {
        match self.try_recover().await {
            Ok(true) => RecoveryOutcome::Recovered,
            Ok(false) => RecoveryOutcome::Clean,
            Err(err) => {
                error!("Error during restart recovery: {}", err);
                RecoveryOutcome::Indeterminate
            }
        }
    }

    async fn try_recover(&self) -> Result<bool, AgentError> {
        let Some(record) = self.tracker.read().await? else {
            return Ok(false);
        };

        warn!(
            "Command tracking record found at {}. The agent likely restarted \
             while running a deployment script. Failing the lifecycle event.",
            self.tracker.path().display()
        );

        info!(
            "Calling PutHostCommandComplete: Failed {}",
            record.host_command_identifier
        );
        self.client
            .put_host_command_complete(
                &record.host_command_identifier,
                CompletionStatus::Failed,
                &Diagnostics::failed_after_restart(
                    "Failing in-progress lifecycle event after an agent restart.",
                ),
            )
            .await?;

        self.tracker.delete().await?;
        Ok(true)
    }

    /// Poll once; submit a received command to the pool.
    ///
    /// Polls are serialized on the caller's task: the control plane does not
    /// re-offer a command until the previous poll's command is acknowledged.
    pub async fn tick(&self) -> Result<(), AgentError> {
        let Some(command) = self.next_command().await? else {
            return Ok(());
        };

        let lifecycle = self.lifecycle.clone();
        let submitted = self
            .pool
            .submit(async move {
                if let Err(err) = lifecycle.run(&command).await {
                    error!(
                        "Error processing command {}: {}",
                        command.host_command_identifier, err
                    );
                }
            })
            .await;

        match submitted {
            Ok(()) => Ok(()),
            Err(AgentError::PoolShutdown) => {
                warn!("Graceful shutdown initiated, skipping polled command");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Poll the control plane and validate the offered command
    async fn next_command(&self) -> Result<Option<HostCommand>, AgentError> {
        debug!("Calling PollHostCommand");
        let command = self.client.poll_host_command(&self.host_identifier).await?;

        let Some(command) = command else {
            debug!("PollHostCommand: no command offered");
            return Ok(None);
        };

        debug!(
            "PollHostCommand: Host Identifier = {}; Host Command Identifier = {}; \
             Deployment Execution ID = {}; Command Name = {}",
            command.host_identifier,
            command.host_command_identifier,
            command.deployment_execution_id,
            command.command_name
        );

        command.validate_for_host(&self.host_identifier)?;
        Ok(Some(command))
    }
}

/// Run the poller worker
pub async fn run<S, F>(
    options: &Options,
    poller: &CommandPoller,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Command poller starting...");

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Command poller shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with poll
            }
        }

        if let Err(err) = poller.tick().await {
            error!("Error polling for host commands: {}", err);
        }
    }
}
