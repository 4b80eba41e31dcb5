//! Cooperative cancellation for in-flight executions.

mod token;

pub use token::{CancelCallback, CancellationToken};
