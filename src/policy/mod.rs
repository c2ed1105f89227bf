//! Policy & audit fabric (spec §4.4):
//! - L3 inference of `{serverType, serverSource, transport, endpoint}`
//! - L4 request construction (single + batched, catalog/working-set scoped)
//! - M1 batch normalization with fail-closed synthesis
//! - L7 asynchronous audit with bounded backpressure
//!
//! Grounded on `turbomcp-auth::audit` for the event shape and on
//! `turbomcp-proxy::proxy::auth` for the "never trust a single decision
//! axis" posture (deny and error are distinct).

pub mod audit;
pub mod batch;
pub mod client;
pub mod inference;
pub mod request;

pub use audit::{AuditEvent, AuditWorker};
pub use batch::normalize_batch;
pub use client::PolicyClient;
pub use inference::{infer, Inference};
pub use request::{Action, PolicyRequest, Target};

use serde::{Deserialize, Serialize};

/// A policy decision. `allowed` and `error` are distinct axes: an
/// evaluator failure is never silently treated as success (Invariant 6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None, error: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()), error: None }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self { allowed: false, reason: None, error: Some(error.into()) }
    }

    /// Fail-closed rule (spec §4.4): any error or explicit `allowed=false`
    /// means the operation must be refused.
    pub fn is_refused(&self) -> bool {
        !self.allowed || self.error.is_some()
    }

    pub fn outcome_reason(&self) -> &'static str {
        if self.error.is_some() { "policy_error" } else { "policy_rule" }
    }
}
