//! Pluggable approval policies.

use crate::tools::ApprovalMode;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A call awaiting an approval decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    /// Tool name.
    pub tool_name: String,
    /// Call arguments.
    pub parameters: Map<String, Value>,
    /// Mode the decision is made under.
    pub mode: ApprovalMode,
}

/// Decides whether a call may run.
#[async_trait]
pub trait ApprovalPolicy: Send + Sync {
    /// Returns true to approve.
    async fn decide(&self, request: &ApprovalRequest) -> bool;
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissivePolicy;

#[async_trait]
impl ApprovalPolicy for PermissivePolicy {
    async fn decide(&self, _request: &ApprovalRequest) -> bool {
        true
    }
}

/// Denies everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllPolicy;

#[async_trait]
impl ApprovalPolicy for DenyAllPolicy {
    async fn decide(&self, _request: &ApprovalRequest) -> bool {
        false
    }
}

/// Wraps a synchronous predicate.
pub struct FnPolicy<F> {
    predicate: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&ApprovalRequest) -> bool + Send + Sync,
{
    /// Creates a policy from a predicate.
    pub const fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<F> ApprovalPolicy for FnPolicy<F>
where
    F: Fn(&ApprovalRequest) -> bool + Send + Sync,
{
    async fn decide(&self, request: &ApprovalRequest) -> bool {
        (self.predicate)(request)
    }
}

impl<F> std::fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnPolicy")
    }
}

/// Approves only tools that belong to the current plan.
#[derive(Debug, Default)]
pub struct PlanPolicy {
    steps: RwLock<HashSet<String>>,
}

impl PlanPolicy {
    /// Creates a policy with an initial plan.
    #[must_use]
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: RwLock::new(steps.into_iter().map(Into::into).collect()),
        }
    }

    /// Adds a tool to the plan.
    pub fn approve_step(&self, tool_name: impl Into<String>) {
        self.steps.write().insert(tool_name.into());
    }

    /// Clears the plan.
    pub fn clear(&self) {
        self.steps.write().clear();
    }
}

#[async_trait]
impl ApprovalPolicy for PlanPolicy {
    async fn decide(&self, request: &ApprovalRequest) -> bool {
        self.steps.read().contains(&request.tool_name)
    }
}
