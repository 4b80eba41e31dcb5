//! Tool subsystem.
//!
//! This module provides:
//! - Tool definitions, calls and results
//! - The tool registry with local and remote backings
//! - Argument validation and name suggestions
//! - Command-line tool discovery
//! - The execution manager

mod command;
mod definitions;
mod executor;
mod registry;
mod similarity;
mod validation;

pub use command::{command_definition, CommandTool};
pub use definitions::{
    ApprovalMode, ToolCall, ToolCallOutcome, ToolDefinition, ToolExecution, ToolResult,
    ToolState, UnresolvedToolCall,
};
pub use executor::{ExecutionManager, ExecutionOptions};
pub use registry::{ServerLocator, Tool, ToolBacking, ToolRegistry};
pub use similarity::{closest_match, similarity_ratio, SUGGESTION_THRESHOLD};
pub use validation::{json_type_name, validate_arguments};
