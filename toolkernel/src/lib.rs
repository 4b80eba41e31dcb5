//! # Toolkernel
//!
//! A tool execution kernel for AI agents.
//!
//! Toolkernel lets a model-driven agent invoke named tools safely:
//!
//! - **Tool registry**: local tools and tools hosted on remote tool servers
//! - **Execution manager**: validation, approval gating, admission control and
//!   timeouts, with every call ending in a structured result
//! - **Resource quotas**: fractional CPU, memory and concurrency reservations
//! - **Security layer**: per-mode approval policies and scoped tokens
//! - **Event loop**: cooperative dispatch of kernel events and AI turns
//! - **Adaptive loop**: AI-assisted fallback when deterministic logic gives up
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use toolkernel::prelude::*;
//!
//! let kernel = Kernel::builder().config(KernelConfig::default()).build()?;
//! kernel.register_tool(Arc::new(MyTool::new()));
//! kernel.start().await;
//!
//! let outcome = kernel
//!     .execute(ToolCall::from_json("my_tool", json!({"path": "/tmp"})))
//!     .await;
//! println!("{}", outcome.result.llm_content);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adaptive;
pub mod cancellation;
pub mod config;
pub mod connections;
pub mod errors;
pub mod event_loop;
pub mod events;
pub mod kernel;
pub mod observability;
pub mod resources;
pub mod security;
pub mod testing;
pub mod tools;
pub mod utils;

pub use kernel::{Kernel, KernelBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adaptive::{AdaptiveLoopService, AiOrchestrator};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::KernelConfig;
    pub use crate::connections::{
        ClientConnector, ConnectionManager, ConnectionRecord, ConnectionStatus, ToolServerClient,
    };
    pub use crate::errors::{ConnectionError, KernelError, ToolError, ToolErrorKind};
    pub use crate::event_loop::{ContentGenerator, Event, EventLoop, Turn, TurnEvent};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::kernel::{Kernel, KernelBuilder};
    pub use crate::observability::init_tracing;
    pub use crate::resources::{ResourceAllocationManager, ResourceQuota};
    pub use crate::security::{ApprovalPolicy, SecurityLayer};
    pub use crate::tools::{
        ApprovalMode, ExecutionManager, ExecutionOptions, Tool, ToolCall, ToolCallOutcome,
        ToolDefinition, ToolRegistry, ToolResult, ToolState,
    };
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
