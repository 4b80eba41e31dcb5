//! Tool definitions, calls, results and execution records.

use crate::errors::{KernelError, ToolError, ToolErrorKind};
use crate::resources::ResourceQuota;
use crate::utils::{generate_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How an execution is gated before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalMode {
    /// Standard policy of the security layer.
    #[default]
    Default,
    /// Only calls belonging to a pre-approved plan run.
    Plan,
    /// Non-destructive calls run without asking.
    AutoEdit,
    /// Everything runs without approval.
    Yolo,
}

impl ApprovalMode {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Plan => "PLAN",
            Self::AutoEdit => "AUTO_EDIT",
            Self::Yolo => "YOLO",
        }
    }
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of a callable tool.
///
/// Serialises to the OpenAI function-calling shape:
/// `{"type": "function", "function": {name, description, parameters}, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireDefinition", into = "WireDefinition")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
    /// Whether the call must pass the approval gate.
    pub approval_required: bool,
    /// Approval mode used when the caller does not override it.
    pub approval_mode: ApprovalMode,
    /// Per-tool resource reservation; the kernel default applies when unset.
    pub resource_quota: Option<ResourceQuota>,
}

impl ToolDefinition {
    /// Creates a definition with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            approval_required: true,
            approval_mode: ApprovalMode::Default,
            resource_quota: None,
        }
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets whether approval is required.
    #[must_use]
    pub const fn with_approval_required(mut self, required: bool) -> Self {
        self.approval_required = required;
        self
    }

    /// Sets the default approval mode.
    #[must_use]
    pub const fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = mode;
        self
    }

    /// Sets the resource reservation.
    #[must_use]
    pub const fn with_resource_quota(mut self, quota: ResourceQuota) -> Self {
        self.resource_quota = Some(quota);
        self
    }

    /// Returns the names listed under `required` in the schema.
    #[must_use]
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns the declared type of a parameter, if any.
    #[must_use]
    pub fn parameter_type(&self, parameter: &str) -> Option<&str> {
        self.parameters
            .get("properties")
            .and_then(|p| p.get(parameter))
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
    }
}

#[derive(Serialize, Deserialize)]
struct FunctionSpec {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "empty_object_schema")]
    parameters: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

const fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct WireDefinition {
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: FunctionSpec,
    #[serde(default = "default_true")]
    approval_required: bool,
    #[serde(default)]
    approval_mode: ApprovalMode,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<WireDefinition> for ToolDefinition {
    fn from(wire: WireDefinition) -> Self {
        Self {
            name: wire.function.name,
            description: wire.function.description,
            parameters: wire.function.parameters,
            approval_required: wire.approval_required,
            approval_mode: wire.approval_mode,
            resource_quota: None,
        }
    }
}

impl From<ToolDefinition> for WireDefinition {
    fn from(def: ToolDefinition) -> Self {
        Self {
            kind: function_type(),
            function: FunctionSpec {
                name: def.name,
                description: def.description,
                parameters: def.parameters,
            },
            approval_required: def.approval_required,
            approval_mode: def.approval_mode,
        }
    }
}

/// A request to invoke a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id assigned by the model.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Parsed arguments.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// A raw call that could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedToolCall {
    /// The call id, if present.
    pub id: Option<String>,
    /// The tool name, if present.
    pub name: Option<String>,
    /// What was wrong with it.
    pub error: String,
    /// The raw payload.
    pub raw: Value,
}

impl ToolCall {
    /// Creates a call with a generated id.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: format!("call_{}", generate_id()),
            name: name.into(),
            arguments,
        }
    }

    /// Creates a call from a JSON object literal; non-objects yield no arguments.
    #[must_use]
    pub fn from_json(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, arguments)
    }

    /// Sets the call id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Parses an OpenAI-style tool call.
    ///
    /// `arguments` may be a JSON-encoded string or an object.
    pub fn from_openai_format(raw: &Value) -> Result<Self, UnresolvedToolCall> {
        let id = raw.get("id").and_then(Value::as_str).map(String::from);
        let unresolved = |name: Option<String>, error: &str| UnresolvedToolCall {
            id: id.clone(),
            name,
            error: error.to_string(),
            raw: raw.clone(),
        };

        let Some(function) = raw.get("function") else {
            return Err(unresolved(None, "Missing function wrapper"));
        };
        let Some(name) = function.get("name").and_then(Value::as_str) else {
            return Err(unresolved(None, "Missing tool name"));
        };
        let name = name.to_string();

        let arguments = match function.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(s)) if s.trim().is_empty() => Map::new(),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(unresolved(Some(name), "Arguments must be a JSON object")),
                Err(e) => {
                    return Err(unresolved(
                        Some(name),
                        &format!("Invalid JSON in arguments: {e}"),
                    ))
                }
            },
            Some(_) => return Err(unresolved(Some(name), "Arguments must be a JSON object")),
        };

        Ok(Self {
            id: id.unwrap_or_else(|| format!("call_{}", generate_id())),
            name,
            arguments,
        })
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool that produced the result.
    pub tool_name: String,
    /// Content handed back to the model.
    #[serde(default)]
    pub llm_content: String,
    /// Content shown to the user.
    #[serde(default)]
    pub return_display: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure class, when the kernel produced the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolResult {
    /// Creates a successful result with the same content for model and user.
    #[must_use]
    pub fn ok(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            tool_name: tool_name.into(),
            llm_content: content.clone(),
            return_display: content,
            success: true,
            error: None,
            error_kind: None,
        }
    }

    /// Sets a distinct display string.
    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.return_display = display.into();
        self
    }

    /// Creates a failed result reported by a tool itself.
    #[must_use]
    pub fn failure(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            tool_name: tool_name.into(),
            llm_content: format!("Error: {error}"),
            return_display: error.clone(),
            success: false,
            error: Some(error),
            error_kind: None,
        }
    }

    /// Converts a kernel-side failure into a result.
    #[must_use]
    pub fn from_error(err: &ToolError) -> Self {
        let mut result = Self::failure(err.tool_name(), err.to_string());
        result.error_kind = Some(err.kind());
        result
    }
}

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolState {
    /// Arguments are being checked.
    Validating,
    /// Waiting for an approval decision.
    AwaitingApproval,
    /// Approved and waiting for admission.
    Scheduled,
    /// Running.
    Executing,
    /// Finished, with or without error. Terminal.
    Completed,
}

impl ToolState {
    const fn rank(self) -> u8 {
        match self {
            Self::Validating => 0,
            Self::AwaitingApproval => 1,
            Self::Scheduled => 2,
            Self::Executing => 3,
            Self::Completed => 4,
        }
    }

    /// Returns true if moving to `next` goes forward.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Scheduled => "scheduled",
            Self::Executing => "executing",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ToolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one execution as it moves through the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Execution id.
    pub id: String,
    /// Tool name.
    pub tool_name: String,
    /// Arguments as submitted.
    pub arguments: Map<String, Value>,
    /// Current state.
    pub state: ToolState,
    /// Every state entered, in order.
    pub history: Vec<ToolState>,
    /// Final result once completed.
    pub result: Option<ToolResult>,
    /// When the execution was created.
    pub created_at: Timestamp,
    /// When execution started.
    pub executed_at: Option<Timestamp>,
    /// When the execution completed.
    pub completed_at: Option<Timestamp>,
}

impl ToolExecution {
    /// Creates a record in the `Validating` state.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: generate_id(),
            tool_name: tool_name.into(),
            arguments,
            state: ToolState::Validating,
            history: vec![ToolState::Validating],
            result: None,
            created_at: now_utc(),
            executed_at: None,
            completed_at: None,
        }
    }

    /// Moves to `next`, refusing backward moves and anything after completion.
    pub fn transition(&mut self, next: ToolState) -> Result<(), KernelError> {
        if !self.state.can_transition_to(next) {
            return Err(KernelError::InvalidTransition {
                execution_id: self.id.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.history.push(next);
        if next == ToolState::Executing {
            self.executed_at = Some(now_utc());
        }
        Ok(())
    }

    /// Stores the result and moves to `Completed`.
    pub fn complete(&mut self, result: ToolResult) -> Result<(), KernelError> {
        self.transition(ToolState::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(now_utc());
        Ok(())
    }

    /// Returns true once the execution is completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }
}

/// A batch result correlated with its originating call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    /// Id of the originating call.
    pub call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Id of the execution record.
    pub execution_id: String,
    /// The result.
    pub result: ToolResult,
}

impl ToolCallOutcome {
    /// Returns true if the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.success
    }
}
