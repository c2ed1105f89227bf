//! L7 — Audit pipeline: build audit events from a policy request +
//! decision, and submit them asynchronously via a bounded queue with a
//! drop-on-full policy (spec §4.4, §5 "auditEvents channel").
//!
//! Grounded on `turbomcp-auth::audit`'s event shape, reworked as a single
//! process-wide worker draining a `tokio::sync::mpsc` channel, matching
//! the non-blocking-send-then-log-and-continue pattern the teacher uses
//! for its own backpressure-sensitive paths (`turbomcp-server::routing`
//! dispatch queues).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::{Action, PolicyDecision, PolicyRequest};
use super::client::PolicyEvaluator;

/// Capacity of the audit queue (spec §4.4: "capacity 100").
pub const AUDIT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub catalog: Option<String>,
    pub working_set: Option<String>,
    pub server: String,
    pub server_type: String,
    pub server_source: String,
    pub transport: String,
    pub tool: Option<String>,
    pub action: Action,
    pub result: AuditResult,
    pub outcome_reason: &'static str,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn build(
        request: &PolicyRequest,
        decision: &PolicyDecision,
        client_name: Option<String>,
        client_version: Option<String>,
    ) -> Self {
        Self {
            catalog: request.catalog.clone(),
            working_set: request.working_set.clone(),
            server: request.server.clone(),
            server_type: request.server_type.clone(),
            server_source: request.server_source.clone(),
            transport: request.transport.clone(),
            tool: request.tool.clone(),
            action: request.action,
            result: if decision.is_refused() { AuditResult::Denied } else { AuditResult::Allowed },
            outcome_reason: decision.outcome_reason(),
            client_name,
            client_version,
            timestamp: Utc::now(),
        }
    }
}

/// Producer handle for submitting audit events. Cloning is cheap; every
/// handler holds one.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditSink {
    /// Non-blocking send. On a full queue, logs "audit event dropped due to
    /// backpressure" and returns without error — producers never block or
    /// fail the request because of audit pressure.
    pub fn submit(&self, event: AuditEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            warn!("audit event dropped due to backpressure");
        }
    }
}

/// The single, process-wide worker that drains the audit queue and
/// forwards events to the policy client, ignoring submission errors.
pub struct AuditWorker {
    handle: tokio::task::JoinHandle<()>,
}

impl AuditWorker {
    pub fn spawn(policy: Arc<dyn PolicyEvaluator>) -> (AuditSink, Self) {
        let (tx, mut rx) = mpsc::channel(AUDIT_QUEUE_CAPACITY);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                policy.submit_audit(&event).await;
            }
        });
        (AuditSink { tx }, Self { handle })
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}
