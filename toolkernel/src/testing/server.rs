//! In-memory tool server.

use crate::connections::{ClientConnector, RemoteToolInfo, ToolServerClient};
use crate::errors::{ConnectionError, ToolError};
use crate::tools::ToolResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct RemoteExecution {
    tool_name: String,
    arguments: Map<String, Value>,
    pending_polls: usize,
}

/// A tool server that answers every execution with its own arguments.
///
/// Executions stay pending for a configurable number of polls. Submissions and
/// polls can be made to fail.
#[derive(Default)]
pub struct MockToolServer {
    tools: Mutex<Vec<RemoteToolInfo>>,
    executions: Mutex<HashMap<String, RemoteExecution>>,
    submissions: Mutex<Vec<(String, Map<String, Value>)>>,
    pending_polls: AtomicUsize,
    polls: AtomicUsize,
    fail_submissions: AtomicBool,
    fail_polls: AtomicBool,
    closed: AtomicBool,
}

impl MockToolServer {
    /// Creates a server with no tools.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertises a tool taking a `message` string.
    #[must_use]
    pub fn with_tool(self, name: &str) -> Self {
        self.add_tool(name);
        self
    }

    /// Advertises a tool after construction.
    pub fn add_tool(&self, name: &str) {
        self.tools.lock().push(RemoteToolInfo {
            name: name.to_string(),
            description: format!("Mock tool {name}"),
            parameter_schema: json!({
                "type": "object",
                "properties": {"message": {"type": "string"}}
            }),
        });
    }

    /// Sets how many polls each new execution stays pending for.
    pub fn set_pending_polls(&self, polls: usize) {
        self.pending_polls.store(polls, Ordering::SeqCst);
    }

    /// Makes submissions fail with a transport error.
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Makes polls fail with a transport error.
    pub fn fail_polls(&self, fail: bool) {
        self.fail_polls.store(fail, Ordering::SeqCst);
    }

    /// Returns every accepted submission.
    #[must_use]
    pub fn submissions(&self) -> Vec<(String, Map<String, Value>)> {
        self.submissions.lock().clone()
    }

    /// Returns the number of result polls received.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Returns true once `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServerClient for MockToolServer {
    fn endpoint(&self) -> String {
        "mock://tool-server".to_string()
    }

    async fn list_tools(&self) -> Result<Vec<RemoteToolInfo>, ToolError> {
        Ok(self.tools.lock().clone())
    }

    async fn submit_execution(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(ToolError::transport(tool_name, "connection refused"));
        }
        let mut submissions = self.submissions.lock();
        submissions.push((tool_name.to_string(), arguments.clone()));
        let id = format!("exec-{}", submissions.len());

        self.executions.lock().insert(
            id.clone(),
            RemoteExecution {
                tool_name: tool_name.to_string(),
                arguments: arguments.clone(),
                pending_polls: self.pending_polls.load(Ordering::SeqCst),
            },
        );
        Ok(id)
    }

    async fn get_execution_result(
        &self,
        execution_id: &str,
    ) -> Result<Option<ToolResult>, ToolError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail_polls.load(Ordering::SeqCst) {
            return Err(ToolError::transport(execution_id, "connection reset"));
        }

        let mut executions = self.executions.lock();
        let Some(execution) = executions.get_mut(execution_id) else {
            return Err(ToolError::transport(execution_id, "unknown execution"));
        };
        if execution.pending_polls > 0 {
            execution.pending_polls -= 1;
            return Ok(None);
        }
        let content = Value::Object(execution.arguments.clone()).to_string();
        Ok(Some(ToolResult::ok(execution.tool_name.clone(), content)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MockToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockToolServer")
            .field("tools", &self.tools.lock().len())
            .field("submissions", &self.submissions.lock().len())
            .field("polls", &self.poll_count())
            .finish_non_exhaustive()
    }
}

/// Connector handing out a shared [`MockToolServer`].
#[derive(Debug)]
pub struct MockConnector {
    server: Arc<MockToolServer>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    attempts: AtomicUsize,
}

impl MockConnector {
    /// Creates a connector whose every handshake reaches `server`.
    #[must_use]
    pub fn new(server: Arc<MockToolServer>) -> Self {
        Self {
            server,
            failing: HashSet::new(),
            delay: None,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Makes handshakes with `url` fail.
    #[must_use]
    pub fn failing_for(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    /// Delays every handshake.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of handshakes attempted.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientConnector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(url) {
            return Err(ConnectionError::handshake(url, "connection refused"));
        }
        let client: Arc<dyn ToolServerClient> = self.server.clone();
        Ok(client)
    }
}
