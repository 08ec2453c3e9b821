//! Deployment specification model

use serde::Deserialize;

use crate::errors::AgentError;

/// Parsed deployment specification.
///
/// Only `deployment_id` is interpreted here; the rest of the envelope is
/// carried through untouched for the executor.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentSpec {
    /// Deployment this command belongs to
    pub deployment_id: String,

    /// Remaining envelope fields, opaque to the polling core
    #[serde(flatten)]
    pub envelope: serde_json::Map<String, serde_json::Value>,
}

impl DeploymentSpec {
    /// Parse the raw envelope fetched from the control plane
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        let spec: DeploymentSpec = serde_json::from_str(raw).map_err(|e| {
            AgentError::ProtocolError(format!("unparseable deployment specification: {}", e))
        })?;
        if spec.deployment_id.is_empty() {
            return Err(AgentError::ProtocolError(
                "deployment specification missing deployment_id".to_string(),
            ));
        }
        Ok(spec)
    }

    /// Look up a top-level envelope field
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.envelope.get(name)
    }
}
