//! AI-assisted adaptation.
//!
//! When the kernel meets a situation it cannot resolve on its own (an unknown
//! tool name, a missing field in a server response) it can ask an
//! [`AiOrchestrator`] for a value. Whatever happens, the caller gets a value
//! back: the orchestrator's answer or the supplied fallback.

mod parser;
mod service;

pub use parser::parse_response;
pub use service::{AdaptiveLoopService, AiOrchestrator};
