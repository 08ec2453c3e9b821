//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Test stages in which credential overrides are honored.
const TEST_STAGES: &[&str] = &["beta", "gamma"];

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Control plane configuration
    #[serde(default)]
    pub control_plane: ControlPlaneSettings,

    /// Identifier this host registers with the control plane.
    /// Commands whose host identifier is not contained in this value are rejected.
    #[serde(default)]
    pub host_identifier: String,

    /// Where the agent obtains control-plane credentials
    #[serde(default)]
    pub credentials: CredentialsPolicy,

    /// Test stage name; credential overrides are only honored in a test stage
    #[serde(default)]
    pub test_profile: Option<String>,

    /// Polling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum time to wait for in-flight commands during shutdown
    #[serde(default = "default_shutdown_wait")]
    pub shutdown_wait_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_shutdown_wait() -> u64 {
    90
}

impl Settings {
    /// Whether credential overrides are allowed for this profile
    pub fn test_profile_active(&self) -> bool {
        self.test_profile
            .as_deref()
            .map(|p| TEST_STAGES.contains(&p.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            control_plane: ControlPlaneSettings::default(),
            host_identifier: String::new(),
            credentials: CredentialsPolicy::default(),
            test_profile: None,
            poll_interval_secs: default_poll_interval(),
            shutdown_wait_secs: default_shutdown_wait(),
        }
    }
}

/// Control plane API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneSettings {
    /// Base URL for the control plane API
    #[serde(default = "default_control_plane_url")]
    pub base_url: String,

    /// Region the agent reports against
    #[serde(default)]
    pub region: Option<String>,

    /// Optional path to a PEM-encoded CA certificate bundle for control
    /// plane TLS verification. When absent, the system store is used.
    #[serde(default)]
    pub ssl_ca_path: Option<PathBuf>,
}

fn default_control_plane_url() -> String {
    "https://commands.convoy.internal/v1".to_string()
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            base_url: default_control_plane_url(),
            region: None,
            ssl_ca_path: None,
        }
    }
}

/// Where the agent sources its control-plane credentials.
///
/// Selected once at startup; there is no ambient environment fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CredentialsPolicy {
    /// Use the machine's instance profile; the transport signs requests itself
    #[default]
    InstanceProfile,

    /// Read a token from an on-premises credentials file
    OnPremisesFile { path: PathBuf },

    /// A literal token, honored only when a test profile is active
    TestOverride { token: String },
}

impl CredentialsPolicy {
    /// Resolve the policy to an optional bearer token.
    ///
    /// `InstanceProfile` resolves to no token. `TestOverride` outside an
    /// active test profile is a configuration error.
    pub async fn resolve(&self, test_profile_active: bool) -> Result<Option<String>, AgentError> {
        match self {
            CredentialsPolicy::InstanceProfile => Ok(None),
            CredentialsPolicy::OnPremisesFile { path } => {
                let contents = File::new(path.clone()).read_string().await.map_err(|e| {
                    AgentError::ConfigError(format!(
                        "failed to read credentials file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Some(contents.trim().to_string()))
            }
            CredentialsPolicy::TestOverride { token } => {
                if !test_profile_active {
                    return Err(AgentError::ConfigError(
                        "credential override requires an active test profile".to_string(),
                    ));
                }
                Ok(Some(token.clone()))
            }
        }
    }
}
