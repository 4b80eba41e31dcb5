//! Logging setup and execution span attributes.

mod tracing;

pub use self::tracing::{init_tracing, ExecutionSpanAttributes, SpanTimer};
