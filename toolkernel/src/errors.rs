//! Error types for the tool kernel.
//!
//! Scheduler-facing failures are expressed as [`ToolError`] and always end up
//! inside a [`ToolResult`](crate::tools::ToolResult); nothing crosses the
//! execution boundary as a panic or an `Err`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A tool-related error.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// A connection-related error.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An execution attempted to move backwards in its lifecycle.
    #[error("Invalid state transition for execution {execution_id}: {from} -> {to}")]
    InvalidTransition {
        /// The execution id.
        execution_id: String,
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of tool failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Arguments did not match the parameter schema.
    Validation,
    /// No tool with the requested name is registered.
    NotFound,
    /// The resource gate refused admission.
    ResourceExhausted,
    /// Talking to a tool server failed.
    Transport,
    /// The execution did not finish in time.
    Timeout,
    /// The approval policy refused the call.
    ApprovalDenied,
    /// The execution was cancelled.
    Cancelled,
    /// The tool ran and reported a failure.
    ExecutionFailed,
}

impl ToolErrorKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::ApprovalDenied => "approval_denied",
            Self::Cancelled => "cancelled",
            Self::ExecutionFailed => "execution_failed",
        }
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn not_found_message(name: &str, suggestion: Option<&String>) -> String {
    match suggestion {
        Some(s) => format!("Tool '{name}' not found. Did you mean '{s}'?"),
        None => format!("Tool '{name}' not found"),
    }
}

/// Tool-specific errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    /// Arguments failed validation against the parameter schema.
    #[error("{message}")]
    Validation {
        /// The tool name.
        tool: String,
        /// The offending parameter.
        parameter: String,
        /// Full human-readable message.
        message: String,
    },

    /// Tool was not found in the registry.
    #[error("{}", not_found_message(name, suggestion.as_ref()))]
    NotFound {
        /// The requested tool name.
        name: String,
        /// Closest registered name, if one is similar enough.
        suggestion: Option<String>,
    },

    /// Resource quota could not be granted.
    #[error("Resource quota exceeded for tool '{name}'")]
    ResourceExhausted {
        /// The tool name.
        name: String,
    },

    /// Remote transport failed.
    #[error("Transport error for tool '{name}': {reason}")]
    Transport {
        /// The tool name.
        name: String,
        /// The reason for failure.
        reason: String,
    },

    /// Execution timed out.
    #[error("Tool '{name}' timeout after {timeout_seconds}s")]
    Timeout {
        /// The tool name.
        name: String,
        /// The timeout in seconds.
        timeout_seconds: f64,
    },

    /// Approval policy refused the call.
    #[error("Tool '{name}' was not approved ({mode} mode)")]
    ApprovalDenied {
        /// The tool name.
        name: String,
        /// The approval mode that was in effect.
        mode: String,
    },

    /// Execution was cancelled.
    #[error("Tool '{name}' execution cancelled: {reason}")]
    Cancelled {
        /// The tool name.
        name: String,
        /// The cancellation reason.
        reason: String,
    },

    /// Tool execution failed.
    #[error("Tool execution failed: {name} - {reason}")]
    ExecutionFailed {
        /// The tool name.
        name: String,
        /// The reason for failure.
        reason: String,
    },
}

impl ToolError {
    /// Creates a missing-parameter validation error.
    #[must_use]
    pub fn missing_parameter(tool: impl Into<String>, parameter: impl Into<String>) -> Self {
        let tool = tool.into();
        let parameter = parameter.into();
        let message = format!("Missing required parameter '{parameter}' for tool '{tool}'");
        Self::Validation {
            tool,
            parameter,
            message,
        }
    }

    /// Creates a type-mismatch validation error.
    #[must_use]
    pub fn type_mismatch(
        tool: impl Into<String>,
        parameter: impl Into<String>,
        expected: &str,
        actual: &str,
    ) -> Self {
        let tool = tool.into();
        let parameter = parameter.into();
        let message = format!(
            "Parameter '{parameter}' for tool '{tool}' should be {expected}, got {actual}"
        );
        Self::Validation {
            tool,
            parameter,
            message,
        }
    }

    /// Creates a tool not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>, suggestion: Option<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            suggestion,
        }
    }

    /// Creates a resource exhausted error.
    #[must_use]
    pub fn resource_exhausted(name: impl Into<String>) -> Self {
        Self::ResourceExhausted { name: name.into() }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(name: impl Into<String>, timeout_seconds: f64) -> Self {
        Self::Timeout {
            name: name.into(),
            timeout_seconds,
        }
    }

    /// Creates an approval denied error.
    #[must_use]
    pub fn approval_denied(name: impl Into<String>, mode: impl Into<String>) -> Self {
        Self::ApprovalDenied {
            name: name.into(),
            mode: mode.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an execution failed error.
    #[must_use]
    pub fn execution_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ToolErrorKind {
        match self {
            Self::Validation { .. } => ToolErrorKind::Validation,
            Self::NotFound { .. } => ToolErrorKind::NotFound,
            Self::ResourceExhausted { .. } => ToolErrorKind::ResourceExhausted,
            Self::Transport { .. } => ToolErrorKind::Transport,
            Self::Timeout { .. } => ToolErrorKind::Timeout,
            Self::ApprovalDenied { .. } => ToolErrorKind::ApprovalDenied,
            Self::Cancelled { .. } => ToolErrorKind::Cancelled,
            Self::ExecutionFailed { .. } => ToolErrorKind::ExecutionFailed,
        }
    }

    /// Returns the tool name the error refers to.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        match self {
            Self::Validation { tool, .. } => tool,
            Self::NotFound { name, .. }
            | Self::ResourceExhausted { name }
            | Self::Transport { name, .. }
            | Self::Timeout { name, .. }
            | Self::ApprovalDenied { name, .. }
            | Self::Cancelled { name, .. }
            | Self::ExecutionFailed { name, .. } => name,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "kind".to_string(),
            serde_json::Value::String(self.kind().as_str().to_string()),
        );
        map.insert(
            "tool".to_string(),
            serde_json::Value::String(self.tool_name().to_string()),
        );
        map.insert(
            "message".to_string(),
            serde_json::Value::String(self.to_string()),
        );

        match self {
            Self::Validation { parameter, .. } => {
                map.insert(
                    "parameter".to_string(),
                    serde_json::Value::String(parameter.clone()),
                );
            }
            Self::NotFound {
                suggestion: Some(s),
                ..
            } => {
                map.insert(
                    "suggestion".to_string(),
                    serde_json::Value::String(s.clone()),
                );
            }
            Self::Timeout {
                timeout_seconds, ..
            } => {
                map.insert(
                    "timeout_seconds".to_string(),
                    serde_json::json!(timeout_seconds),
                );
            }
            _ => {}
        }

        map
    }
}

/// Errors raised while managing tool server connections.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The handshake with a server failed.
    #[error("Failed to connect to {url}: {reason}")]
    Handshake {
        /// Server URL.
        url: String,
        /// The reason for failure.
        reason: String,
    },

    /// The handshake did not complete in time.
    #[error("Connection to {url} timed out after {timeout_seconds}s")]
    Timeout {
        /// Server URL.
        url: String,
        /// The timeout in seconds.
        timeout_seconds: u64,
    },

    /// The connection registry could not be read or written.
    #[error("Connection store error: {0}")]
    Store(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConnectionError {
    /// Creates a handshake error.
    #[must_use]
    pub fn handshake(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handshake {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
