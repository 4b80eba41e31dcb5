//! Human-in-the-loop approval.
//!
//! Each request parks on a oneshot channel until a UI calls
//! [`InteractiveApproval::approve`] or [`InteractiveApproval::deny`]. A request
//! that is not answered within the timeout is denied.

use super::policy::{ApprovalPolicy, ApprovalRequest};
use crate::utils::{now_utc, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Why a request ended without a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// Nobody answered in time.
    TimedOut,
    /// The request was withdrawn.
    Cancelled,
}

/// A request waiting for a decision, as shown to a reviewer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    /// Request id.
    pub id: Uuid,
    /// Tool name.
    pub tool_name: String,
    /// Message for the reviewer.
    pub message: String,
    /// When the request was created.
    pub created_at: Timestamp,
}

struct Slot {
    info: PendingApproval,
    response_tx: oneshot::Sender<bool>,
}

/// Approval policy that waits for a reviewer.
pub struct InteractiveApproval {
    requests: RwLock<HashMap<Uuid, Slot>>,
    timeout: Duration,
}

impl Default for InteractiveApproval {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl InteractiveApproval {
    /// Creates a service that denies unanswered requests after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Parks a request until it is decided.
    pub async fn request_approval(
        &self,
        tool_name: &str,
        message: &str,
    ) -> Result<bool, ApprovalStatus> {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.requests.write().insert(
            id,
            Slot {
                info: PendingApproval {
                    id,
                    tool_name: tool_name.to_string(),
                    message: message.to_string(),
                    created_at: now_utc(),
                },
                response_tx: tx,
            },
        );
        info!(request_id = %id, tool = %tool_name, "Approval requested");

        let outcome = tokio::time::timeout(self.timeout, rx).await;
        self.requests.write().remove(&id);
        match outcome {
            Ok(Ok(approved)) => Ok(approved),
            Ok(Err(_)) => Err(ApprovalStatus::Cancelled),
            Err(_) => {
                debug!(request_id = %id, "Approval timed out");
                Err(ApprovalStatus::TimedOut)
            }
        }
    }

    fn respond(&self, request_id: Uuid, approved: bool) -> bool {
        self.requests
            .write()
            .remove(&request_id)
            .is_some_and(|slot| slot.response_tx.send(approved).is_ok())
    }

    /// Approves a pending request.
    pub fn approve(&self, request_id: Uuid) -> bool {
        self.respond(request_id, true)
    }

    /// Denies a pending request.
    pub fn deny(&self, request_id: Uuid) -> bool {
        self.respond(request_id, false)
    }

    /// Withdraws a pending request; the waiter sees `Cancelled`.
    pub fn cancel(&self, request_id: Uuid) -> bool {
        self.requests.write().remove(&request_id).is_some()
    }

    /// Returns the pending requests, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingApproval> {
        let mut pending: Vec<PendingApproval> = self
            .requests
            .read()
            .values()
            .map(|s| s.info.clone())
            .collect();
        pending.sort_by_key(|p| p.created_at);
        pending
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.read().len()
    }
}

#[async_trait]
impl ApprovalPolicy for InteractiveApproval {
    async fn decide(&self, request: &ApprovalRequest) -> bool {
        let message = format!(
            "Allow '{}' with arguments {} ({} mode)?",
            request.tool_name,
            serde_json::Value::Object(request.parameters.clone()),
            request.mode
        );
        self.request_approval(&request.tool_name, &message)
            .await
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for InteractiveApproval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveApproval")
            .field("pending_count", &self.pending_count())
            .field("timeout", &self.timeout)
            .finish()
    }
}
