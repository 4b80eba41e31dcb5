//! Lifecycle event emission.
//!
//! The execution manager reports every state change of a tool execution to an
//! [`EventSink`]. Sinks are for observability only; they never influence
//! scheduling.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the execution manager.
pub mod names {
    /// A call entered the scheduler.
    pub const TOOL_INVOKED: &str = "tool.invoked";
    /// An execution moved to a new state.
    pub const TOOL_STATE_CHANGED: &str = "tool.state_changed";
    /// An execution finished successfully.
    pub const TOOL_COMPLETED: &str = "tool.completed";
    /// An execution finished with an error.
    pub const TOOL_FAILED: &str = "tool.failed";
    /// An approval decision was requested.
    pub const APPROVAL_REQUESTED: &str = "approval.requested";
    /// An approval decision was made.
    pub const APPROVAL_DECIDED: &str = "approval.decided";
}
