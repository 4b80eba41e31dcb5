//! Content generator collaborator.

use crate::tools::ToolCallOutcome;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Continues a conversation from turn output.
///
/// Every method has a no-op default so implementors only handle what they
/// need.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Receives a content chunk.
    async fn on_content(&self, _turn_id: &str, _text: &str) {}

    /// Receives the results of a tool call batch, in call order.
    async fn on_tool_results(&self, _turn_id: &str, _outcomes: Vec<ToolCallOutcome>) {}

    /// Called when the turn finishes.
    async fn on_turn_finished(&self, _turn_id: &str, _reason: Option<&str>) {}
}

/// Ignores all turn output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpContentGenerator;

#[async_trait]
impl ContentGenerator for NoOpContentGenerator {}

/// What a [`CollectingContentGenerator`] received.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorInput {
    /// A content chunk.
    Content(String, String),
    /// A batch of tool results.
    ToolResults(String, Vec<ToolCallOutcome>),
    /// A finish marker.
    Finished(String, Option<String>),
}

/// Records everything it receives.
#[derive(Debug, Default)]
pub struct CollectingContentGenerator {
    inputs: Mutex<Vec<GeneratorInput>>,
}

impl CollectingContentGenerator {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded inputs in arrival order.
    #[must_use]
    pub fn inputs(&self) -> Vec<GeneratorInput> {
        self.inputs.lock().clone()
    }

    /// Returns every tool result received.
    #[must_use]
    pub fn outcomes(&self) -> Vec<ToolCallOutcome> {
        self.inputs
            .lock()
            .iter()
            .filter_map(|i| match i {
                GeneratorInput::ToolResults(_, outcomes) => Some(outcomes.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Returns the ids of finished turns.
    #[must_use]
    pub fn finished_turns(&self) -> Vec<String> {
        self.inputs
            .lock()
            .iter()
            .filter_map(|i| match i {
                GeneratorInput::Finished(id, _) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ContentGenerator for CollectingContentGenerator {
    async fn on_content(&self, turn_id: &str, text: &str) {
        self.inputs
            .lock()
            .push(GeneratorInput::Content(turn_id.to_string(), text.to_string()));
    }

    async fn on_tool_results(&self, turn_id: &str, outcomes: Vec<ToolCallOutcome>) {
        self.inputs
            .lock()
            .push(GeneratorInput::ToolResults(turn_id.to_string(), outcomes));
    }

    async fn on_turn_finished(&self, turn_id: &str, reason: Option<&str>) {
        self.inputs.lock().push(GeneratorInput::Finished(
            turn_id.to_string(),
            reason.map(String::from),
        ));
    }
}
