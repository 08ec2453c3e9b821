//! HTTP client implementation

use std::path::PathBuf;

use reqwest::{header, Certificate, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::AgentError;

/// Options for the control plane HTTP client
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Base URL for the control plane API
    pub base_url: String,

    /// Region the agent reports against
    pub region: Option<String>,

    /// Optional PEM CA bundle overriding the system trust store
    pub ssl_ca_path: Option<PathBuf>,

    /// Optional bearer token resolved from the credentials policy
    pub token: Option<String>,
}

/// HTTP client for control plane communication
pub struct HttpClient {
    client: Client,
    base_url: String,
    region: Option<String>,
    token: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client.
    ///
    /// Fails when the CA bundle cannot be read or parsed; the agent must not
    /// start polling with a broken TLS configuration.
    pub async fn new(options: ClientOptions) -> Result<Self, AgentError> {
        let mut builder = Client::builder().timeout(std::time::Duration::from_secs(30));

        if let Some(ca_path) = &options.ssl_ca_path {
            let pem = tokio::fs::read(ca_path).await.map_err(|e| {
                AgentError::ConfigError(format!(
                    "failed to read CA bundle {}: {}",
                    ca_path.display(),
                    e
                ))
            })?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|e| {
                AgentError::ConfigError(format!(
                    "invalid CA bundle {}: {}",
                    ca_path.display(),
                    e
                ))
            })?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            region: options.region,
            token: options.token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a POST request
    pub(crate) async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AgentError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let mut request = self.client.post(&url).json(body);

        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(region) = &self.region {
            request = request.header("X-Convoy-Region", region);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP POST failed: {} - {}", status, body);
            return Err(AgentError::ProtocolError(format!("{}: {}", status, body)));
        }

        let body = response.json().await?;
        Ok(body)
    }
}
