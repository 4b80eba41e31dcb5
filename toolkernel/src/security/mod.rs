//! Security layer: access tokens and per-mode approval policies.

mod approval;
mod policy;
mod tokens;

pub use approval::{ApprovalStatus, InteractiveApproval, PendingApproval};
pub use policy::{
    ApprovalPolicy, ApprovalRequest, DenyAllPolicy, FnPolicy, PermissivePolicy, PlanPolicy,
};
pub use tokens::{SecurityLayer, TokenInfo};
