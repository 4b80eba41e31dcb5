//! HTTP transport for tool servers.
//!
//! Endpoints:
//! - `GET  /health`
//! - `GET  /tools`
//! - `POST /tools/{name}/execute` -> `{"execution_id": ...}`
//! - `GET  /executions/{id}` -> `{"state": ..., "result": {...} | null}`

use super::client::{ClientConnector, RemoteToolInfo, ToolServerClient};
use crate::errors::{ConnectionError, ToolError};
use crate::tools::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ToolsResponse {
    #[serde(default)]
    tools: Vec<RemoteToolInfo>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    execution_id: String,
}

#[derive(Debug, Deserialize)]
struct RemoteResult {
    #[serde(default)]
    llm_content: String,
    #[serde(default)]
    return_display: String,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

const fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ExecutionResponse {
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    result: Option<RemoteResult>,
}

/// Tool server client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpToolServerClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpToolServerClient {
    /// Creates a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ConnectionError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConnectionError::handshake(&base_url, e.to_string()))?;
        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // Each segment is percent-encoded, so names cannot escape their path slot.
    fn segment_url(&self, segments: &[&str]) -> Result<reqwest::Url, String> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| e.to_string())?;
        url.path_segments_mut()
            .map_err(|()| format!("{} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Checks `GET /health`.
    pub async fn health(&self) -> Result<(), ConnectionError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| ConnectionError::handshake(&self.base_url, e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ConnectionError::handshake(
                &self.base_url,
                format!("health check returned {}", response.status()),
            ))
        }
    }
}

#[async_trait]
impl ToolServerClient for HttpToolServerClient {
    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn list_tools(&self) -> Result<Vec<RemoteToolInfo>, ToolError> {
        let response = self
            .client
            .get(self.url("/tools"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ToolError::transport("*", e.to_string()))?;
        let body: ToolsResponse = response
            .json()
            .await
            .map_err(|e| ToolError::transport("*", e.to_string()))?;
        Ok(body.tools)
    }

    async fn submit_execution(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        let url = self
            .segment_url(&["tools", tool_name, "execute"])
            .map_err(|reason| ToolError::transport(tool_name, reason))?;
        let response = self
            .client
            .post(url)
            .json(arguments)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ToolError::transport(tool_name, e.to_string()))?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ToolError::transport(tool_name, e.to_string()))?;
        debug!(tool = %tool_name, execution_id = %body.execution_id, "Submitted remote execution");
        Ok(body.execution_id)
    }

    async fn get_execution_result(
        &self,
        execution_id: &str,
    ) -> Result<Option<ToolResult>, ToolError> {
        let url = self
            .segment_url(&["executions", execution_id])
            .map_err(|reason| ToolError::transport(execution_id, reason))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ToolError::transport(execution_id, e.to_string()))?;
        let body: ExecutionResponse = response
            .json()
            .await
            .map_err(|e| ToolError::transport(execution_id, e.to_string()))?;

        debug!(execution_id = %execution_id, state = ?body.state, "Polled remote execution");
        Ok(body.result.map(|r| ToolResult {
            tool_name: body.tool_name,
            llm_content: r.llm_content,
            return_display: r.return_display,
            success: r.success,
            error: r.error,
            error_kind: None,
        }))
    }
}

/// Opens [`HttpToolServerClient`]s after a health check.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    request_timeout: Duration,
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl HttpConnector {
    /// Creates a connector whose clients use `request_timeout`.
    #[must_use]
    pub const fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl ClientConnector for HttpConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
        let client = HttpToolServerClient::new(url, self.request_timeout)?;
        client.health().await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_response_pending() {
        let body: ExecutionResponse =
            serde_json::from_value(json!({"id": "e1", "tool_name": "echo", "state": "executing", "result": null}))
                .unwrap();
        assert!(body.result.is_none());
        assert_eq!(body.state.as_deref(), Some("executing"));
    }

    #[test]
    fn test_execution_response_done() {
        let body: ExecutionResponse = serde_json::from_value(json!({
            "tool_name": "echo",
            "state": "completed",
            "result": {"llm_content": "hi", "return_display": "hi", "success": true, "error": null}
        }))
        .unwrap();
        let result = body.result.unwrap();
        assert!(result.success);
        assert_eq!(result.llm_content, "hi");
    }

    #[test]
    fn test_tools_response() {
        let body: ToolsResponse = serde_json::from_value(json!({
            "tools": [{"name": "echo", "description": "Echo", "parameter_schema": {"type": "object"}}]
        }))
        .unwrap();
        assert_eq!(body.tools.len(), 1);
        assert_eq!(body.tools[0].name, "echo");
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = HttpToolServerClient::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000");
        assert_eq!(client.url("/tools"), "http://localhost:8000/tools");
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let client = HttpToolServerClient::new("http://localhost:8000/api/", Duration::from_secs(1)).unwrap();
        let url = client.segment_url(&["tools", "a/b?c#d", "execute"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/tools/a%2Fb%3Fc%23d/execute");

        let url = client.segment_url(&["executions", "exec-1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/executions/exec-1");
    }

    #[test]
    fn test_unparseable_base_url_is_reported() {
        let client = HttpToolServerClient::new("not a url", Duration::from_secs(1)).unwrap();
        assert!(client.segment_url(&["tools"]).is_err());
    }

    #[tokio::test]
    async fn test_connect_unreachable_fails() {
        let connector = HttpConnector::new(Duration::from_millis(200));
        let result = connector.connect("http://127.0.0.1:1").await;
        assert!(result.is_err());
    }
}
