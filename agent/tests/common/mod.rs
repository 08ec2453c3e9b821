//! Scripted collaborators shared by the integration tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use convoyd::deploy::executor::CommandExecutor;
use convoyd::deploy::tracker::CommandTracker;
use convoyd::errors::AgentError;
use convoyd::http::commands::ControlPlaneApi;
use convoyd::models::command::{
    CommandStatus, CompletionStatus, HostCommand, SpecificationEnvelope, SpecificationResponse,
};
use convoyd::models::diagnostics::Diagnostics;
use convoyd::models::spec::DeploymentSpec;

/// The host identifier the fakes assume the agent runs as
pub const AGENT_HOST: &str = "i-agent";

/// One recorded control plane call
#[derive(Debug, Clone)]
pub enum Call {
    Poll,
    Acknowledge {
        host_command_identifier: String,
        payload: String,
    },
    GetSpecification {
        deployment_execution_id: String,
    },
    Complete {
        host_command_identifier: String,
        status: CompletionStatus,
        payload: String,
    },
}

/// Control plane fake returning scripted responses and recording every call
pub struct FakeControlPlane {
    pub calls: Mutex<Vec<Call>>,
    pub poll_queue: Mutex<VecDeque<HostCommand>>,
    pub ack_status: CommandStatus,
    pub deployment_system: String,
    pub envelope: Option<String>,
    pub fail_completion: bool,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            poll_queue: Mutex::new(VecDeque::new()),
            ack_status: CommandStatus::Pending,
            deployment_system: "Convoy".to_string(),
            envelope: Some(r#"{"deployment_id":"d-1"}"#.to_string()),
            fail_completion: false,
        }
    }

    pub fn offer(&self, command: HostCommand) {
        self.poll_queue.lock().unwrap().push_back(command);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<(String, CompletionStatus, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Complete {
                    host_command_identifier,
                    status,
                    payload,
                } => Some((host_command_identifier, status, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn acknowledgements(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Acknowledge {
                    host_command_identifier,
                    payload,
                } => Some((host_command_identifier, payload)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ControlPlaneApi for FakeControlPlane {
    async fn poll_host_command(
        &self,
        _host_identifier: &str,
    ) -> Result<Option<HostCommand>, AgentError> {
        self.calls.lock().unwrap().push(Call::Poll);
        Ok(self.poll_queue.lock().unwrap().pop_front())
    }

    async fn put_host_command_acknowledgement(
        &self,
        host_command_identifier: &str,
        diagnostics: &Diagnostics,
    ) -> Result<CommandStatus, AgentError> {
        self.calls.lock().unwrap().push(Call::Acknowledge {
            host_command_identifier: host_command_identifier.to_string(),
            payload: diagnostics.payload.clone(),
        });
        Ok(self.ack_status.clone())
    }

    async fn get_deployment_specification(
        &self,
        deployment_execution_id: &str,
        _host_identifier: &str,
    ) -> Result<SpecificationResponse, AgentError> {
        self.calls.lock().unwrap().push(Call::GetSpecification {
            deployment_execution_id: deployment_execution_id.to_string(),
        });
        Ok(SpecificationResponse {
            deployment_system: self.deployment_system.clone(),
            deployment_specification: self.envelope.clone().map(|generic_envelope| {
                SpecificationEnvelope { generic_envelope }
            }),
        })
    }

    async fn put_host_command_complete(
        &self,
        host_command_identifier: &str,
        status: CompletionStatus,
        diagnostics: &Diagnostics,
    ) -> Result<(), AgentError> {
        self.calls.lock().unwrap().push(Call::Complete {
            host_command_identifier: host_command_identifier.to_string(),
            status,
            payload: diagnostics.payload.clone(),
        });
        if self.fail_completion {
            return Err(AgentError::ProtocolError(
                "500: completion rejected".to_string(),
            ));
        }
        Ok(())
    }
}

/// Executor fake recording executions and optionally failing once
pub struct FakeExecutor {
    pub system: String,
    pub noop: bool,
    pub error: Mutex<Option<AgentError>>,
    pub executed: Mutex<Vec<String>>,
    pub tracker: Option<CommandTracker>,
    pub record_present_during_run: Mutex<Option<bool>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            system: "Convoy".to_string(),
            noop: false,
            error: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
            tracker: None,
            record_present_during_run: Mutex::new(None),
        }
    }

    /// Observe the tracking record from inside the executor call
    pub fn watching_tracker(tracker: CommandTracker) -> Self {
        Self {
            tracker: Some(tracker),
            ..Self::new()
        }
    }

    pub fn failing_with(error: AgentError) -> Self {
        Self {
            error: Mutex::new(Some(error)),
            ..Self::new()
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    fn deployment_system(&self) -> &str {
        &self.system
    }

    async fn is_command_noop(
        &self,
        _command_name: &str,
        _spec: &DeploymentSpec,
    ) -> Result<bool, AgentError> {
        Ok(self.noop)
    }

    async fn execute_command(
        &self,
        command: &HostCommand,
        _spec: &DeploymentSpec,
    ) -> Result<(), AgentError> {
        if let Some(tracker) = &self.tracker {
            *self.record_present_during_run.lock().unwrap() = Some(tracker.exists().await);
        }
        self.executed
            .lock()
            .unwrap()
            .push(command.host_command_identifier.clone());
        match self.error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// A command addressed to [`AGENT_HOST`]
pub fn command(id: &str, name: &str) -> HostCommand {
    HostCommand {
        host_identifier: AGENT_HOST.to_string(),
        host_command_identifier: id.to_string(),
        deployment_execution_id: format!("exec-{}", id),
        command_name: name.to_string(),
    }
}
