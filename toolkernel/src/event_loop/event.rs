//! Events and turns carried by the event loop.

use crate::tools::{ToolCall, ToolCallOutcome};
use crate::utils::{generate_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A kernel event dispatched by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type used for handler lookup.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    #[serde(default, alias = "data")]
    pub payload: Value,
    /// When the event was created.
    #[serde(default = "now_utc")]
    pub timestamp: Timestamp,
    /// Correlates related events.
    #[serde(default = "generate_id")]
    pub correlation_id: String,
}

impl Event {
    /// Creates an event with a fresh correlation id.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: now_utc(),
            correlation_id: generate_id(),
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

/// One item of an AI response turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A chunk of generated text.
    Content {
        /// The text.
        text: String,
    },
    /// Tool calls requested by the model.
    ToolCallRequest {
        /// The calls, executed as one batch.
        calls: Vec<ToolCall>,
    },
    /// A tool result produced outside this loop.
    ToolCallResponse {
        /// The correlated result.
        outcome: ToolCallOutcome,
    },
    /// The model finished the turn.
    Finished {
        /// Finish reason reported by the model.
        #[serde(default)]
        reason: Option<String>,
    },
}

/// One AI response processing unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Turn id.
    pub id: String,
    /// Items in arrival order.
    pub events: Vec<TurnEvent>,
}

impl Default for Turn {
    fn default() -> Self {
        Self::new()
    }
}

impl Turn {
    /// Creates an empty turn.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: generate_id(),
            events: Vec::new(),
        }
    }

    /// Sets the turn id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Appends a content chunk.
    #[must_use]
    pub fn with_content(mut self, text: impl Into<String>) -> Self {
        self.events.push(TurnEvent::Content { text: text.into() });
        self
    }

    /// Appends a tool call batch.
    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.events.push(TurnEvent::ToolCallRequest { calls });
        self
    }

    /// Appends an externally produced tool result.
    #[must_use]
    pub fn with_tool_response(mut self, outcome: ToolCallOutcome) -> Self {
        self.events.push(TurnEvent::ToolCallResponse { outcome });
        self
    }

    /// Appends the finish marker.
    #[must_use]
    pub fn finished(mut self, reason: Option<String>) -> Self {
        self.events.push(TurnEvent::Finished { reason });
        self
    }

    /// Returns every tool call requested in the turn.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::ToolCallRequest { calls } => Some(calls.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}
