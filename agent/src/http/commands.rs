//! Host command API client

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::errors::AgentError;
use crate::http::client::HttpClient;
use crate::models::command::{
    AcknowledgementResponse, CommandStatus, CompletionStatus, HostCommand,
    PollHostCommandResponse, SpecificationResponse,
};
use crate::models::diagnostics::Diagnostics;

/// Control plane RPCs consumed by the polling core.
///
/// Implemented by [`HttpClient`]; tests substitute scripted fakes.
#[async_trait]
pub trait ControlPlaneApi: Send + Sync {
    /// Ask the control plane for the next command, if any
    async fn poll_host_command(
        &self,
        host_identifier: &str,
    ) -> Result<Option<HostCommand>, AgentError>;

    /// Acknowledge a command, reporting the no-op determination
    async fn put_host_command_acknowledgement(
        &self,
        host_command_identifier: &str,
        diagnostics: &Diagnostics,
    ) -> Result<CommandStatus, AgentError>;

    /// Fetch the deployment specification for a command
    async fn get_deployment_specification(
        &self,
        deployment_execution_id: &str,
        host_identifier: &str,
    ) -> Result<SpecificationResponse, AgentError>;

    /// Report a terminal command status
    async fn put_host_command_complete(
        &self,
        host_command_identifier: &str,
        status: CompletionStatus,
        diagnostics: &Diagnostics,
    ) -> Result<(), AgentError>;
}

#[async_trait]
impl ControlPlaneApi for HttpClient {
    async fn poll_host_command(
        &self,
        host_identifier: &str,
    ) -> Result<Option<HostCommand>, AgentError> {
        debug!("Calling PollHostCommand");
        let response: PollHostCommandResponse = self
            .post(
                "/host-commands/poll",
                &json!({ "host_identifier": host_identifier }),
            )
            .await?;
        Ok(response.host_command)
    }

    async fn put_host_command_acknowledgement(
        &self,
        host_command_identifier: &str,
        diagnostics: &Diagnostics,
    ) -> Result<CommandStatus, AgentError> {
        debug!("Calling PutHostCommandAcknowledgement");
        let response: AcknowledgementResponse = self
            .post(
                "/host-commands/acknowledge",
                &json!({
                    "host_command_identifier": host_command_identifier,
                    "diagnostics": diagnostics,
                }),
            )
            .await?;
        debug!("Command Status = {:?}", response.command_status);
        Ok(response.command_status)
    }

    async fn get_deployment_specification(
        &self,
        deployment_execution_id: &str,
        host_identifier: &str,
    ) -> Result<SpecificationResponse, AgentError> {
        debug!("Calling GetDeploymentSpecification");
        let response: SpecificationResponse = self
            .post(
                "/deployments/specification",
                &json!({
                    "deployment_execution_id": deployment_execution_id,
                    "host_identifier": host_identifier,
                }),
            )
            .await?;
        debug!("Deployment System = {}", response.deployment_system);
        Ok(response)
    }

    async fn put_host_command_complete(
        &self,
        host_command_identifier: &str,
        status: CompletionStatus,
        diagnostics: &Diagnostics,
    ) -> Result<(), AgentError> {
        debug!("Calling PutHostCommandComplete: {:?}", status);
        let _: serde_json::Value = self
            .post(
                "/host-commands/complete",
                &json!({
                    "host_command_identifier": host_command_identifier,
                    "command_status": status,
                    "diagnostics": diagnostics,
                }),
            )
            .await?;
        Ok(())
    }
}
