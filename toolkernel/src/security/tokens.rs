//! Access tokens and the approval gate.

use super::policy::{ApprovalPolicy, ApprovalRequest, PermissivePolicy};
use crate::tools::ApprovalMode;
use crate::utils::{now_utc, Timestamp};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration as ChronoDuration;
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

const TOKEN_BYTES: usize = 32;

/// Metadata stored for an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Granted permissions.
    pub permissions: HashSet<String>,
    /// Issue time.
    pub created_at: Timestamp,
    /// Expiry time.
    pub expires_at: Timestamp,
    /// False once revoked.
    pub active: bool,
}

impl TokenInfo {
    fn is_usable(&self, now: Timestamp) -> bool {
        self.active && now < self.expires_at
    }
}

// Out-of-range expiries saturate instead of overflowing.
fn expiry_after(created_at: Timestamp, expiry_minutes: i64) -> Timestamp {
    ChronoDuration::try_minutes(expiry_minutes)
        .and_then(|d| created_at.checked_add_signed(d))
        .unwrap_or(if expiry_minutes < 0 {
            Timestamp::MIN_UTC
        } else {
            Timestamp::MAX_UTC
        })
}

// Table keys are SHA-256 digests; raw tokens are never stored.
fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

struct Policies {
    default: Arc<dyn ApprovalPolicy>,
    plan: Arc<dyn ApprovalPolicy>,
    auto_edit: Arc<dyn ApprovalPolicy>,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            default: Arc::new(PermissivePolicy),
            plan: Arc::new(PermissivePolicy),
            auto_edit: Arc::new(PermissivePolicy),
        }
    }
}

/// Issues access tokens and makes approval decisions.
#[derive(Default)]
pub struct SecurityLayer {
    tokens: Mutex<HashMap<String, TokenInfo>>,
    policies: RwLock<Policies>,
}

impl SecurityLayer {
    /// Creates a layer with permissive policies and no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the policy used for `mode`. `Yolo` has no policy and is ignored.
    #[must_use]
    pub fn with_policy(self, mode: ApprovalMode, policy: Arc<dyn ApprovalPolicy>) -> Self {
        self.set_policy(mode, policy);
        self
    }

    /// Replaces the policy used for `mode`. Returns false for `Yolo`.
    pub fn set_policy(&self, mode: ApprovalMode, policy: Arc<dyn ApprovalPolicy>) -> bool {
        let mut policies = self.policies.write();
        match mode {
            ApprovalMode::Default => policies.default = policy,
            ApprovalMode::Plan => policies.plan = policy,
            ApprovalMode::AutoEdit => policies.auto_edit = policy,
            ApprovalMode::Yolo => return false,
        }
        true
    }

    /// Creates a token carrying `permissions`, valid for `expiry_minutes`.
    pub fn create_token<I, S>(&self, permissions: I, expiry_minutes: i64) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let created_at = now_utc();
        let info = TokenInfo {
            permissions: permissions.into_iter().map(Into::into).collect(),
            created_at,
            expires_at: expiry_after(created_at, expiry_minutes),
            active: true,
        };
        debug!(permissions = info.permissions.len(), expiry_minutes, "Token created");
        self.tokens.lock().insert(digest(&token), info);
        token
    }

    /// Returns true if the token exists, is active and has not expired.
    ///
    /// Expired and revoked tokens are evicted as a side effect.
    pub fn validate_token(&self, token: &str) -> bool {
        let key = digest(token);
        let mut tokens = self.tokens.lock();
        match tokens.get(&key) {
            Some(info) if info.is_usable(now_utc()) => true,
            Some(_) => {
                tokens.remove(&key);
                debug!("Evicted unusable token");
                false
            }
            None => false,
        }
    }

    /// Returns true if the token is valid and grants `permission`.
    pub fn check_permission(&self, token: &str, permission: &str) -> bool {
        if !self.validate_token(token) {
            return false;
        }
        self.tokens
            .lock()
            .get(&digest(token))
            .is_some_and(|info| info.permissions.contains(permission))
    }

    /// Marks a token inactive. Returns false for unknown tokens.
    pub fn revoke_token(&self, token: &str) -> bool {
        match self.tokens.lock().get_mut(&digest(token)) {
            Some(info) => {
                info.active = false;
                info!("Token revoked");
                true
            }
            None => false,
        }
    }

    /// Returns the number of tokens currently stored, including unswept ones.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.lock().len()
    }

    /// Decides whether `tool_name` may run under `mode`.
    ///
    /// `Yolo` is always approved; other modes defer to their policy.
    pub async fn approve(
        &self,
        tool_name: &str,
        parameters: &Map<String, Value>,
        mode: ApprovalMode,
    ) -> bool {
        let policy = {
            let policies = self.policies.read();
            match mode {
                ApprovalMode::Yolo => return true,
                ApprovalMode::Default => policies.default.clone(),
                ApprovalMode::Plan => policies.plan.clone(),
                ApprovalMode::AutoEdit => policies.auto_edit.clone(),
            }
        };

        let request = ApprovalRequest {
            tool_name: tool_name.to_string(),
            parameters: parameters.clone(),
            mode,
        };
        let approved = policy.decide(&request).await;
        debug!(tool = %tool_name, %mode, approved, "Approval decided");
        approved
    }
}

impl std::fmt::Debug for SecurityLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityLayer")
            .field("token_count", &self.token_count())
            .finish_non_exhaustive()
    }
}
