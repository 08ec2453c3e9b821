//! Application configuration options

use std::time::Duration;

use crate::http::client::ClientOptions;
use crate::storage::layout::StorageLayout;
use crate::workers::{poller, pool};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Control plane client configuration
    pub control_plane: ClientOptions,

    /// Identifier this host registers with the control plane
    pub host_identifier: String,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Poller worker options
    pub poller: poller::Options,

    /// Worker pool options
    pub pool: pool::PoolOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            control_plane: ClientOptions::default(),
            host_identifier: String::new(),
            storage: StorageOptions::default(),
            poller: poller::Options::default(),
            pool: pool::PoolOptions::default(),
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum time to wait for in-flight commands during graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(90),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,
}
