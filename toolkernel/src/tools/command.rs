//! Local tools backed by executables on `PATH`.

use super::definitions::{ToolDefinition, ToolResult};
use super::registry::Tool;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Definition used for a discovered command.
#[must_use]
pub fn command_definition(command: &str) -> ToolDefinition {
    ToolDefinition::new(command, format!("Run the '{command}' command"))
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "args": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Command-line arguments"
                }
            }
        }))
        .with_approval_required(true)
}

/// Runs a program with string arguments and returns its stdout.
#[derive(Debug, Clone)]
pub struct CommandTool {
    definition: ToolDefinition,
    program: PathBuf,
}

impl CommandTool {
    /// Creates a tool for `program`, registered under `name`.
    #[must_use]
    pub fn new(name: &str, program: impl Into<PathBuf>) -> Self {
        Self {
            definition: command_definition(name),
            program: program.into(),
        }
    }

    /// Replaces the definition.
    #[must_use]
    pub fn with_definition(mut self, definition: ToolDefinition) -> Self {
        self.definition = definition;
        self
    }
}

fn string_args(args: &Map<String, Value>) -> Result<Vec<String>, String> {
    match args.get("args") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                other => Err(format!("unsupported argument: {other}")),
            })
            .collect(),
        Some(other) => Err(format!("'args' must be an array, got {other}")),
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn describe(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolResult {
        let name = self.definition.name.clone();
        let argv = match string_args(&args) {
            Ok(argv) => argv,
            Err(e) => return ToolResult::failure(name, e),
        };

        debug!(tool = %name, program = %self.program.display(), ?argv, "Running command");
        let output = Command::new(&self.program)
            .args(&argv)
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout).trim_end().to_string();
                ToolResult::ok(name, stdout)
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim_end().to_string();
                let code = out
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                ToolResult::failure(name, format!("exit status {code}: {stderr}"))
            }
            Err(e) => ToolResult::failure(name, format!("failed to spawn: {e}")),
        }
    }
}
