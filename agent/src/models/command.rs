//! Host command models

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// One unit of work received from the control plane.
///
/// Immutable once received; every field is assigned by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCommand {
    /// Host this command was issued to
    pub host_identifier: String,

    /// Unique identifier for this command
    pub host_command_identifier: String,

    /// Deployment execution the command belongs to
    pub deployment_execution_id: String,

    /// Lifecycle event name (e.g. "BeforeInstall", "ApplicationStart")
    pub command_name: String,
}

impl HostCommand {
    /// Reject commands that were not addressed to this host or that carry
    /// no lifecycle event name. Runs before any side effect.
    pub fn validate_for_host(&self, host_identifier: &str) -> Result<(), AgentError> {
        if !host_identifier.contains(&self.host_identifier) {
            return Err(AgentError::ProtocolError(format!(
                "Host identifier mismatch: {} != {}",
                host_identifier, self.host_identifier
            )));
        }
        if self.command_name.is_empty() {
            return Err(AgentError::ProtocolError("Command name missing".to_string()));
        }
        Ok(())
    }
}

/// Acknowledgment status returned by the control plane.
///
/// `Failed` here means the control plane could not record the ack, not that
/// the command must not run; the caller disambiguates via the no-op check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Succeeded,
    Failed,
    Pending,

    /// Any status this agent version does not know about
    Unknown,
}

impl<'de> Deserialize<'de> for CommandStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "Succeeded" => CommandStatus::Succeeded,
            "Failed" => CommandStatus::Failed,
            "Pending" => CommandStatus::Pending,
            _ => CommandStatus::Unknown,
        })
    }
}

/// Terminal status reported on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Succeeded,
    Failed,
}

/// Response to `PollHostCommand`
#[derive(Debug, Clone, Deserialize)]
pub struct PollHostCommandResponse {
    /// The offered command, absent when there is no work
    pub host_command: Option<HostCommand>,
}

/// Response to `PutHostCommandAcknowledgement`
#[derive(Debug, Clone, Deserialize)]
pub struct AcknowledgementResponse {
    pub command_status: CommandStatus,
}

/// Response to `GetDeploymentSpecification`
#[derive(Debug, Clone, Deserialize)]
pub struct SpecificationResponse {
    /// Deployment system that produced the specification
    pub deployment_system: String,

    /// The specification envelope, absent on control plane errors
    pub deployment_specification: Option<SpecificationEnvelope>,
}

/// Opaque specification payload wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct SpecificationEnvelope {
    pub generic_envelope: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(host: &str, name: &str) -> HostCommand {
        HostCommand {
            host_identifier: host.to_string(),
            host_command_identifier: "cmd-1".to_string(),
            deployment_execution_id: "exec-1".to_string(),
            command_name: name.to_string(),
        }
    }

    #[test]
    fn test_validate_accepts_matching_host() {
        let cmd = command("i-0abc", "ApplicationStart");
        assert!(cmd.validate_for_host("arn:host/i-0abc").is_ok());
    }

    #[test]
    fn test_validate_rejects_host_mismatch() {
        let cmd = command("i-0abc", "ApplicationStart");
        let err = cmd.validate_for_host("arn:host/i-0def").unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_validate_rejects_empty_command_name() {
        let cmd = command("i-0abc", "");
        assert!(cmd.validate_for_host("i-0abc").is_err());
    }

    #[test]
    fn test_unknown_status_deserializes() {
        let status: CommandStatus = serde_json::from_str("\"InProgress\"").unwrap();
        assert_eq!(status, CommandStatus::Unknown);

        let status: CommandStatus = serde_json::from_str("\"Succeeded\"").unwrap();
        assert_eq!(status, CommandStatus::Succeeded);
    }
}
