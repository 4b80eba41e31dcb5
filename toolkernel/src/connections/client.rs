//! Client side of the tool server protocol.
//!
//! Remote execution is two-phase: `submit_execution` returns an execution id
//! immediately and `get_execution_result` is polled until it yields a result.

use crate::errors::{ConnectionError, ToolError};
use crate::tools::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A tool as advertised by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolInfo {
    /// Tool name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Argument schema.
    #[serde(default, alias = "parameters")]
    pub parameter_schema: Value,
}

impl RemoteToolInfo {
    /// Converts to a definition for the local registry.
    #[must_use]
    pub fn to_definition(&self) -> ToolDefinition {
        let parameters = if self.parameter_schema.is_object() {
            self.parameter_schema.clone()
        } else {
            serde_json::json!({"type": "object", "properties": {}})
        };
        ToolDefinition::new(&self.name, &self.description).with_parameters(parameters)
    }
}

/// Talks to one tool server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolServerClient: Send + Sync {
    /// Base URL of the server.
    fn endpoint(&self) -> String;

    /// Lists the server's tools.
    async fn list_tools(&self) -> Result<Vec<RemoteToolInfo>, ToolError>;

    /// Starts an execution and returns its id.
    async fn submit_execution(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<String, ToolError>;

    /// Returns the result if the execution has finished, `None` while pending.
    async fn get_execution_result(&self, execution_id: &str)
        -> Result<Option<ToolResult>, ToolError>;

    /// Releases the connection.
    async fn close(&self) {}
}

/// Opens clients for server URLs.
#[async_trait]
pub trait ClientConnector: Send + Sync {
    /// Performs the handshake with `url`.
    async fn connect(&self, url: &str) -> Result<Arc<dyn ToolServerClient>, ConnectionError>;
}
