//! Structured tracing for tool executions.

use crate::config::LoggingConfig;
use crate::errors::KernelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Returns an error if a
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), KernelError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| KernelError::Config(format!("invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| KernelError::Internal(format!("tracing already initialised: {e}")))
}

/// Attributes describing one finished execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSpanAttributes {
    /// Execution id.
    pub execution_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Originating call id.
    pub call_id: Option<String>,
    /// Final state.
    pub state: Option<String>,
    /// Wall-clock duration.
    pub duration_ms: Option<f64>,
    /// Whether the call succeeded.
    pub success: Option<bool>,
    /// Failure class.
    pub error_kind: Option<String>,
    /// Error message.
    pub error: Option<String>,
}

impl ExecutionSpanAttributes {
    /// Creates attributes for an execution.
    #[must_use]
    pub fn new(execution_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            tool_name: tool_name.into(),
            ..Default::default()
        }
    }

    /// Sets the call id.
    #[must_use]
    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Sets the final state.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub fn with_outcome(mut self, success: bool, error_kind: Option<String>, error: Option<String>) -> Self {
        self.success = Some(success);
        self.error_kind = error_kind;
        self.error = error;
        self
    }

    /// Converts to OpenTelemetry-style attributes.
    #[must_use]
    pub fn to_otel_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("tool.execution_id".to_string(), self.execution_id.clone());
        attrs.insert("tool.name".to_string(), self.tool_name.clone());

        if let Some(ref v) = self.call_id {
            attrs.insert("tool.call_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.state {
            attrs.insert("tool.state".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("tool.duration_ms".to_string(), format!("{v:.2}"));
        }
        if let Some(v) = self.success {
            attrs.insert("tool.success".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error_kind {
            attrs.insert("tool.error_kind".to_string(), v.clone());
        }
        if let Some(ref v) = self.error {
            attrs.insert("tool.error".to_string(), v.clone());
        }
        attrs
    }

    /// Converts to a JSON payload for event sinks.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Measures elapsed time.
#[derive(Debug, Clone, Copy)]
pub struct SpanTimer {
    start: Instant,
}

impl Default for SpanTimer {
    fn default() -> Self {
        Self::start()
    }
}

impl SpanTimer {
    /// Starts a timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since start.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
