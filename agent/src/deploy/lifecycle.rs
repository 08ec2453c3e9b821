//! Per-command lifecycle: fetch, acknowledge, execute, complete

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::deploy::executor::CommandExecutor;
use crate::deploy::tracker::CommandTracker;
use crate::errors::AgentError;
use crate::http::commands::ControlPlaneApi;
use crate::models::command::{CommandStatus, CompletionStatus, HostCommand};
use crate::models::diagnostics::Diagnostics;
use crate::models::spec::DeploymentSpec;

/// Drives one host command from poll result to completion report.
///
/// Acknowledgment happens before execution; the tracking record brackets
/// the executor call on every path.
#[derive(Clone)]
pub struct CommandLifecycle {
    client: Arc<dyn ControlPlaneApi>,
    executor: Arc<dyn CommandExecutor>,
    tracker: CommandTracker,
    host_identifier: String,
}

impl CommandLifecycle {
    pub fn new(
        client: Arc<dyn ControlPlaneApi>,
        executor: Arc<dyn CommandExecutor>,
        tracker: CommandTracker,
        host_identifier: String,
    ) -> Self {
        Self {
            client,
            executor,
            tracker,
            host_identifier,
        }
    }

    /// Run the command to a terminal state.
    ///
    /// Errors are reported to the control plane as `Completed(Failed)` where
    /// reporting is still possible, then returned so the worker task can log
    /// them. A single bad command never takes the agent down.
    pub async fn run(&self, command: &HostCommand) -> Result<(), AgentError> {
        let spec = match self.fetch_specification(command).await {
            Ok(spec) => spec,
            Err(err) => return self.fail_command(command, err).await,
        };

        let is_noop = match self
            .executor
            .is_command_noop(&command.command_name, &spec)
            .await
        {
            Ok(is_noop) => is_noop,
            Err(err) => return self.fail_command(command, err).await,
        };

        debug!("Calling PutHostCommandAcknowledgement");
        let status = match self
            .client
            .put_host_command_acknowledgement(
                &command.host_command_identifier,
                &Diagnostics::acknowledgement(is_noop),
            )
            .await
        {
            Ok(status) => status,
            Err(err) => return self.fail_command(command, err).await,
        };

        match status {
            CommandStatus::Succeeded => {
                // Already handled elsewhere (replay or another agent); done.
                debug!(
                    "Command {} already acknowledged as handled",
                    command.host_command_identifier
                );
                return Ok(());
            }
            CommandStatus::Failed if is_noop => {
                info!(
                    "Received Failed acknowledging no-op command {}, completing as Succeeded",
                    command.command_name
                );
                self.client
                    .put_host_command_complete(
                        &command.host_command_identifier,
                        CompletionStatus::Succeeded,
                        &Diagnostics::noop_completed(),
                    )
                    .await?;
                return Ok(());
            }
            CommandStatus::Failed => {
                // The control plane failed to record the ack; advisory only.
                info!(
                    "Received Failed acknowledging command {}, executing anyway",
                    command.command_name
                );
            }
            CommandStatus::Pending | CommandStatus::Unknown => {}
        }

        // Crash-recovery checkpoint: must exist before the executor runs.
        if let Err(err) = self
            .tracker
            .write(&spec.deployment_id, &command.host_command_identifier)
            .await
        {
            return self.fail_command(command, err).await;
        }

        let result = self.execute_and_report(command, &spec).await;

        // The record must not outlive the executor call, success or failure.
        if let Err(err) = self.tracker.delete().await {
            error!("Failed to remove command tracking record: {}", err);
        }

        result
    }

    /// Fetch and validate the deployment specification for a command
    async fn fetch_specification(
        &self,
        command: &HostCommand,
    ) -> Result<DeploymentSpec, AgentError> {
        let response = self
            .client
            .get_deployment_specification(&command.deployment_execution_id, &self.host_identifier)
            .await?;

        if response.deployment_system != self.executor.deployment_system() {
            return Err(AgentError::ProtocolError(format!(
                "Deployment System mismatch: {} != {}",
                self.executor.deployment_system(),
                response.deployment_system
            )));
        }

        let envelope = response.deployment_specification.ok_or_else(|| {
            AgentError::ProtocolError("Deployment Specification missing".to_string())
        })?;

        DeploymentSpec::parse(&envelope.generic_envelope)
    }

    async fn execute_and_report(
        &self,
        command: &HostCommand,
        spec: &DeploymentSpec,
    ) -> Result<(), AgentError> {
        debug!(
            "Executing command {} for deployment {}",
            command.command_name, spec.deployment_id
        );

        match self.executor.execute_command(command, spec).await {
            Ok(()) => {
                debug!("Calling PutHostCommandComplete: Succeeded");
                self.client
                    .put_host_command_complete(
                        &command.host_command_identifier,
                        CompletionStatus::Succeeded,
                        &Diagnostics::success(),
                    )
                    .await
            }
            Err(err) => {
                warn!("Calling PutHostCommandComplete: Failed");
                let diagnostics = Diagnostics::from_error(&err);
                if let Err(report_err) = self
                    .client
                    .put_host_command_complete(
                        &command.host_command_identifier,
                        CompletionStatus::Failed,
                        &diagnostics,
                    )
                    .await
                {
                    error!("Failed to report command completion: {}", report_err);
                }
                error!(
                    "Error executing command {}: {}",
                    command.command_name, err
                );
                Err(err)
            }
        }
    }

    /// Report a command as failed before execution began, then surface the error
    async fn fail_command(
        &self,
        command: &HostCommand,
        err: AgentError,
    ) -> Result<(), AgentError> {
        warn!(
            "Calling PutHostCommandComplete: Failed for command {}: {}",
            command.host_command_identifier, err
        );
        let diagnostics = Diagnostics::from_error(&err);
        if let Err(report_err) = self
            .client
            .put_host_command_complete(
                &command.host_command_identifier,
                CompletionStatus::Failed,
                &diagnostics,
            )
            .await
        {
            error!("Failed to report command completion: {}", report_err);
        }
        Err(err)
    }
}
