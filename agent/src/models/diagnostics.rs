//! Diagnostics reported to the control plane

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AgentError;

/// Maximum bytes of script output retained in a diagnostics payload.
const MAX_LOG_BYTES: usize = 2048;

/// Numeric error codes attached to every completion report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorCode {
    Succeeded = 0,
    ScriptMissing = 1,
    ScriptFailed = 2,
    ScriptTimedOut = 3,
    Unknown = 5,
    FailedAfterRestart = 6,
}

impl ScriptErrorCode {
    pub fn as_code(self) -> u8 {
        self as u8
    }
}

/// Tail buffer of script output, capped at [`MAX_LOG_BYTES`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptLog {
    lines: Vec<String>,
}

impl ScriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line of script output
    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Join retained output, keeping only the tail when over the cap
    pub fn concat(&self) -> String {
        let joined = self.lines.join("\n");
        if joined.len() <= MAX_LOG_BYTES {
            return joined;
        }
        // Avoid splitting a UTF-8 character at the cut point
        let mut start = joined.len() - MAX_LOG_BYTES;
        while !joined.is_char_boundary(start) {
            start += 1;
        }
        joined[start..].to_string()
    }
}

/// A structured execution failure raised by the executor collaborator
#[derive(Debug, Clone, Error)]
#[error("{script_name}: {message}")]
pub struct ScriptError {
    pub code: ScriptErrorCode,
    pub script_name: String,
    pub message: String,
    pub log: ScriptLog,
}

impl ScriptError {
    pub fn new(
        code: ScriptErrorCode,
        script_name: impl Into<String>,
        message: impl Into<String>,
        log: ScriptLog,
    ) -> Self {
        Self {
            code,
            script_name: script_name.into(),
            message: message.into(),
            log,
        }
    }
}

/// Structured payload carried inside [`Diagnostics`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsPayload {
    pub error_code: u8,
    pub script_name: String,
    pub message: String,
    pub log: String,
}

/// Diagnostics attached to every acknowledgment and completion call.
///
/// Construction never fails: a payload that cannot be serialized falls back
/// to a minimal hand-built one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub format: String,
    pub payload: String,
}

impl Diagnostics {
    /// Acknowledgment diagnostics carrying the no-op determination
    pub fn acknowledgement(is_noop: bool) -> Self {
        Self {
            format: "JSON".to_string(),
            payload: format!("{{\"IsCommandNoop\":{}}}", is_noop),
        }
    }

    /// A command that ran to completion
    pub fn success() -> Self {
        Self::from_payload(DiagnosticsPayload {
            error_code: ScriptErrorCode::Succeeded.as_code(),
            script_name: String::new(),
            message: "Succeeded".to_string(),
            log: String::new(),
        })
    }

    /// A no-op command completed without execution
    pub fn noop_completed() -> Self {
        Self::from_payload(DiagnosticsPayload {
            error_code: ScriptErrorCode::Succeeded.as_code(),
            script_name: String::new(),
            message: "Succeeded: CompletedNoopCommand".to_string(),
            log: String::new(),
        })
    }

    /// A command interrupted by an agent restart
    pub fn failed_after_restart(message: &str) -> Self {
        Self::from_payload(DiagnosticsPayload {
            error_code: ScriptErrorCode::FailedAfterRestart.as_code(),
            script_name: String::new(),
            message: format!("Failed: {}", message),
            log: String::new(),
        })
    }

    /// Detailed diagnostics for a structured script failure
    pub fn from_script_error(err: &ScriptError) -> Self {
        Self::from_payload(DiagnosticsPayload {
            error_code: err.code.as_code(),
            script_name: err.script_name.clone(),
            message: err.message.clone(),
            log: err.log.concat(),
        })
    }

    /// Diagnostics for any error; non-script errors fold into the
    /// generic unknown code
    pub fn from_error(err: &AgentError) -> Self {
        match err {
            AgentError::ScriptError(script_err) => Self::from_script_error(script_err),
            other => Self::from_payload(DiagnosticsPayload {
                error_code: ScriptErrorCode::Unknown.as_code(),
                script_name: String::new(),
                message: other.to_string(),
                log: String::new(),
            }),
        }
    }

    fn from_payload(payload: DiagnosticsPayload) -> Self {
        let payload = serde_json::to_string(&payload).unwrap_or_else(|_| {
            format!(
                "{{\"error_code\":{},\"script_name\":\"\",\"message\":\"Attempting minimal diagnostics\",\"log\":\"payload serialization failed\"}}",
                payload.error_code
            )
        });
        Self {
            format: "JSON".to_string(),
            payload,
        }
    }
}
