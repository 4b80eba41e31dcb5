//! The adaptive loop service.

use super::parser::parse_response;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Completes prompts with a language model.
#[async_trait]
pub trait AiOrchestrator: Send + Sync {
    /// Returns the model's reply to `prompt`.
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Asks an orchestrator to resolve a problem from context, with a fallback.
#[derive(Clone)]
pub struct AdaptiveLoopService {
    orchestrator: Arc<dyn AiOrchestrator>,
}

impl AdaptiveLoopService {
    /// Creates a service over `orchestrator`.
    #[must_use]
    pub fn new(orchestrator: Arc<dyn AiOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Builds the prompt sent for a problem.
    #[must_use]
    pub fn build_prompt(context: &Value, problem: &str) -> String {
        format!(
            "Context: {context}\n\n\
             Problem: {problem}\n\n\
             Please analyze the context data and identify the most likely field that contains\n\
             the requested information. If you find a value, respond with the field name\n\
             and its value in the format: FIELD_NAME: VALUE\n\n\
             If the information is not available in the context, respond with \"NOT_FOUND\".\n"
        )
    }

    /// Returns the orchestrator's answer to `problem`, or `fallback`.
    ///
    /// Never fails: orchestrator errors, `NOT_FOUND` and empty replies all
    /// yield the fallback.
    pub async fn adapt(&self, context: &Value, problem: &str, fallback: Value) -> Value {
        let prompt = Self::build_prompt(context, problem);
        debug!(prompt = %prompt, "Adaptive loop prompt");

        let reply = match self.orchestrator.complete(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Adaptive loop orchestrator failed, using fallback");
                return fallback;
            }
        };

        match parse_response(&reply) {
            Some(value) => {
                info!(value = %value, "Adaptive loop resolved value");
                value
            }
            None => {
                info!(fallback = %fallback, "Adaptive loop found nothing, using fallback");
                fallback
            }
        }
    }
}

impl std::fmt::Debug for AdaptiveLoopService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveLoopService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockOrchestrator;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "model_response": {"id": "gpt-4-turbo", "max_tokens": 128_000},
            "model_name": "gpt-4-turbo",
            "missing_field": "max_context_length"
        })
    }

    #[tokio::test]
    async fn test_adapt_returns_parsed_value() {
        let orchestrator = Arc::new(MockOrchestrator::new().with_reply("max_tokens: 128000"));
        let service = AdaptiveLoopService::new(orchestrator.clone());

        let value = service
            .adapt(&context(), "Find the maximum context length", json!(4096))
            .await;
        assert_eq!(value, json!(128_000));

        let prompts = orchestrator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Problem: Find the maximum context length"));
        assert!(prompts[0].contains("gpt-4-turbo"));
    }

    #[tokio::test]
    async fn test_adapt_not_found_uses_fallback() {
        let service =
            AdaptiveLoopService::new(Arc::new(MockOrchestrator::new().with_reply("NOT_FOUND")));
        assert_eq!(service.adapt(&context(), "x", json!(9999)).await, json!(9999));
    }

    #[tokio::test]
    async fn test_adapt_error_uses_fallback() {
        let service = AdaptiveLoopService::new(Arc::new(MockOrchestrator::failing()));
        assert_eq!(service.adapt(&context(), "x", json!(9999)).await, json!(9999));
    }

    #[tokio::test]
    async fn test_adapt_empty_reply_uses_fallback() {
        let service = AdaptiveLoopService::new(Arc::new(MockOrchestrator::new().with_reply("")));
        assert_eq!(service.adapt(&context(), "x", Value::Null).await, Value::Null);
    }
}
