//! Mock tools and orchestrator.

use crate::adaptive::AiOrchestrator;
use crate::tools::{Tool, ToolDefinition, ToolResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Echoes its `message` argument back.
#[derive(Debug, Default)]
pub struct EchoTool {
    calls: AtomicUsize,
}

impl EchoTool {
    /// Creates the tool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times the tool ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition::new("echo", "Echoes the message back").with_parameters(json!({
            "type": "object",
            "properties": {"message": {"type": "string", "description": "Text to echo"}},
            "required": ["message"]
        }))
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let message = args.get("message").and_then(Value::as_str).unwrap_or_default();
        ToolResult::ok("echo", message).with_display(format!("echo: {message}"))
    }
}

/// Sleeps before answering.
#[derive(Debug, Clone)]
pub struct SlowTool {
    delay: Duration,
    finished: Arc<AtomicUsize>,
}

impl SlowTool {
    /// Creates a tool named `slow` that takes `delay` to run.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns how many runs slept through to the end. Shared between clones.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition::new("slow", "Sleeps before answering").with_approval_required(false)
    }

    async fn execute(&self, _args: Map<String, Value>) -> ToolResult {
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        ToolResult::ok("slow", "done")
    }
}

/// Panics when run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition::new("panic", "Always panics").with_approval_required(false)
    }

    async fn execute(&self, _args: Map<String, Value>) -> ToolResult {
        panic!("tool panicked on purpose");
    }
}

/// Reports a failure through its result.
#[derive(Debug, Clone)]
pub struct FailingTool {
    error: String,
}

impl FailingTool {
    /// Creates a tool named `fail` reporting `error`.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn describe(&self) -> ToolDefinition {
        ToolDefinition::new("fail", "Always fails").with_approval_required(false)
    }

    async fn execute(&self, _args: Map<String, Value>) -> ToolResult {
        ToolResult::failure("fail", self.error.clone())
    }
}

/// Orchestrator replaying scripted replies.
///
/// Replies are consumed in order; once exhausted it answers `NOT_FOUND`.
#[derive(Debug, Default)]
pub struct MockOrchestrator {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    failing: bool,
    hanging: bool,
}

impl MockOrchestrator {
    /// Creates an orchestrator with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an orchestrator whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Creates an orchestrator that never answers.
    #[must_use]
    pub fn hanging() -> Self {
        Self {
            hanging: true,
            ..Self::default()
        }
    }

    /// Queues a reply.
    #[must_use]
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().push_back(reply.into());
        self
    }

    /// Returns every prompt received.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl AiOrchestrator for MockOrchestrator {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if self.failing {
            anyhow::bail!("orchestrator unavailable");
        }
        if self.hanging {
            futures::future::pending::<()>().await;
        }
        Ok(self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| "NOT_FOUND".to_string()))
    }
}
