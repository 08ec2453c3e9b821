//! Crash-recovery tracking of the command being executed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::storage::layout::StorageLayout;

/// Durable marker proving a command is mid-execution.
///
/// Written before the executor is invoked, removed once it returns. Its
/// presence at startup is the sole signal that the process died mid-command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRecord {
    /// Deployment the interrupted command belonged to
    pub deployment_id: String,

    /// Command that was executing when the process died
    pub host_command_identifier: String,

    /// When the record was written
    pub created_at: DateTime<Utc>,
}

/// Reads and writes the tracking record at its fixed location.
///
/// One slot: a second concurrently tracked command replaces the marker, and
/// recovery resolves only the most recent one.
#[derive(Debug, Clone)]
pub struct CommandTracker {
    file: File,
}

impl CommandTracker {
    /// Create a tracker over the layout's fixed tracking file
    pub fn new(layout: &StorageLayout) -> Self {
        Self {
            file: layout.command_tracking_file(),
        }
    }

    /// Path of the tracking file
    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    /// Record that `host_command_identifier` is about to execute
    pub async fn write(
        &self,
        deployment_id: &str,
        host_command_identifier: &str,
    ) -> Result<(), AgentError> {
        let record = TrackingRecord {
            deployment_id: deployment_id.to_string(),
            host_command_identifier: host_command_identifier.to_string(),
            created_at: Utc::now(),
        };
        self.file.write_json(&record).await
    }

    /// Read the current record, if one exists
    pub async fn read(&self) -> Result<Option<TrackingRecord>, AgentError> {
        if !self.file.exists().await {
            return Ok(None);
        }
        let record = self.file.read_json().await?;
        Ok(Some(record))
    }

    /// Whether a record exists
    pub async fn exists(&self) -> bool {
        self.file.exists().await
    }

    /// Remove the record; removing a missing record is not an error
    pub async fn delete(&self) -> Result<(), AgentError> {
        self.file.delete().await
    }
}
