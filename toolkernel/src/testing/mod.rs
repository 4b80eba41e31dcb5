//! Test doubles for kernel components.
//!
//! This module provides:
//! - Mock local tools (echo, slow, panicking, failing)
//! - An in-memory tool server and connector
//! - A scripted AI orchestrator

mod mocks;
mod server;

pub use mocks::{EchoTool, FailingTool, MockOrchestrator, PanickingTool, SlowTool};
pub use server::{MockConnector, MockToolServer};
