//! Command executor collaborator

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::models::command::HostCommand;
use crate::models::diagnostics::{ScriptError, ScriptErrorCode, ScriptLog};
use crate::models::spec::DeploymentSpec;

/// Deployment system tag this executor declares; specifications stamped
/// with any other system are rejected before acknowledgment.
pub const DEPLOYMENT_SYSTEM: &str = "Convoy";

/// Map lifecycle event names to the hooks they run
pub fn default_hook_mapping() -> HashMap<String, Vec<String>> {
    [
        "BeforeBlockTraffic",
        "AfterBlockTraffic",
        "ApplicationStop",
        "BeforeInstall",
        "AfterInstall",
        "ApplicationStart",
        "BeforeAllowTraffic",
        "AfterAllowTraffic",
        "ValidateService",
    ]
    .into_iter()
    .map(|name| (name.to_string(), vec![name.to_string()]))
    .collect()
}

/// Executes one lifecycle event against a deployment specification
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Deployment system this executor handles
    fn deployment_system(&self) -> &str;

    /// Whether the command requires no work for this specification
    async fn is_command_noop(
        &self,
        command_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<bool, AgentError>;

    /// Run the command; returning without error means it succeeded
    async fn execute_command(
        &self,
        command: &HostCommand,
        spec: &DeploymentSpec,
    ) -> Result<(), AgentError>;
}

/// Runs a single hook script; the sandboxing strategy lives behind this seam
#[async_trait]
pub trait HookRunner: Send + Sync {
    async fn run_hook(&self, hook_name: &str, script: &str) -> Result<(), ScriptError>;
}

/// Default executor: maps lifecycle events to hook scripts named in the
/// specification envelope and runs them in order.
pub struct HookExecutor {
    deployment_system: String,
    hook_mapping: HashMap<String, Vec<String>>,
    runner: Arc<dyn HookRunner>,
}

impl HookExecutor {
    /// Create an executor with the default hook mapping
    pub fn new(runner: Arc<dyn HookRunner>) -> Self {
        Self {
            deployment_system: DEPLOYMENT_SYSTEM.to_string(),
            hook_mapping: default_hook_mapping(),
            runner,
        }
    }

    /// Scripts the specification attaches to `hook_name`
    fn scripts_for(&self, hook_name: &str, spec: &DeploymentSpec) -> Vec<String> {
        spec.field("hooks")
            .and_then(|hooks| hooks.get(hook_name))
            .and_then(|scripts| scripts.as_array())
            .map(|scripts| {
                scripts
                    .iter()
                    .filter_map(|s| s.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandExecutor for HookExecutor {
    fn deployment_system(&self) -> &str {
        &self.deployment_system
    }

    async fn is_command_noop(
        &self,
        command_name: &str,
        spec: &DeploymentSpec,
    ) -> Result<bool, AgentError> {
        let Some(hooks) = self.hook_mapping.get(command_name) else {
            return Ok(true);
        };
        Ok(hooks
            .iter()
            .all(|hook| self.scripts_for(hook, spec).is_empty()))
    }

    async fn execute_command(
        &self,
        command: &HostCommand,
        spec: &DeploymentSpec,
    ) -> Result<(), AgentError> {
        let Some(hooks) = self.hook_mapping.get(&command.command_name) else {
            debug!("No hooks mapped for command {}", command.command_name);
            return Ok(());
        };

        for hook in hooks {
            for script in self.scripts_for(hook, spec) {
                info!(
                    "Running {} script {} for deployment {}",
                    hook, script, spec.deployment_id
                );
                self.runner.run_hook(hook, &script).await?;
            }
        }

        Ok(())
    }
}

/// Hook runner that executes scripts as child processes
pub struct ProcessHookRunner {
    shell: String,
}

impl ProcessHookRunner {
    pub fn new() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
        }
    }
}

impl Default for ProcessHookRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookRunner for ProcessHookRunner {
    async fn run_hook(&self, hook_name: &str, script: &str) -> Result<(), ScriptError> {
        if !Path::new(script).exists() {
            return Err(ScriptError::new(
                ScriptErrorCode::ScriptMissing,
                script,
                format!("Script does not exist at {}", script),
                ScriptLog::new(),
            ));
        }

        let output = Command::new(&self.shell)
            .arg(script)
            .output()
            .await
            .map_err(|e| {
                ScriptError::new(
                    ScriptErrorCode::ScriptFailed,
                    script,
                    format!("Failed to spawn {} hook: {}", hook_name, e),
                    ScriptLog::new(),
                )
            })?;

        let mut log = ScriptLog::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log.append(line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            log.append(line);
        }

        if !output.status.success() {
            return Err(ScriptError::new(
                ScriptErrorCode::ScriptFailed,
                script,
                format!("Script exited with {}", output.status),
                log,
            ));
        }

        debug!("{} script {} succeeded", hook_name, script);
        Ok(())
    }
}
