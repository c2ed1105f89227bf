//! Policy service client: `POST /mcp/policy/evaluate`,
//! `/evaluate-batch`, `/audit` (spec §6 "Wire protocols consumed").
//! Grounded on the teacher's reqwest-based HTTP clients (e.g.
//! `turbomcp-auth::oauth2::http_client`).

use serde::Deserialize;
use std::time::Duration;

use super::{audit::AuditEvent, PolicyDecision, PolicyRequest};
use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Deserialize)]
struct BatchResponse {
    decisions: Vec<PolicyDecision>,
}

/// Thin HTTP client over the policy service. A trait so tests can supply an
/// in-memory fake without spinning up a server (spec's ambient test
/// tooling, §D of SPEC_FULL.md).
#[async_trait::async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, request: &PolicyRequest) -> GatewayResult<PolicyDecision>;
    async fn evaluate_batch(&self, requests: &[PolicyRequest]) -> GatewayResult<Vec<PolicyDecision>>;
    async fn submit_audit(&self, event: &AuditEvent);
}

pub struct PolicyClient {
    base_url: String,
    http: reqwest::Client,
}

impl PolicyClient {
    pub fn new(base_url: impl Into<String>) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::http(e.to_string()))?;
        Ok(Self { base_url: base_url.into(), http })
    }
}

#[async_trait::async_trait]
impl PolicyEvaluator for PolicyClient {
    async fn evaluate(&self, request: &PolicyRequest) -> GatewayResult<PolicyDecision> {
        let url = format!("{}/mcp/policy/evaluate", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GatewayError::http_with_status("policy evaluate failed", resp.status().as_u16()));
        }
        resp.json::<PolicyDecision>().await.map_err(|e| GatewayError::http(e.to_string()))
    }

    async fn evaluate_batch(&self, requests: &[PolicyRequest]) -> GatewayResult<Vec<PolicyDecision>> {
        let url = format!("{}/mcp/policy/evaluate-batch", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| GatewayError::http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GatewayError::http_with_status("policy evaluate-batch failed", resp.status().as_u16()));
        }
        let body: BatchResponse = resp.json().await.map_err(|e| GatewayError::http(e.to_string()))?;
        Ok(body.decisions)
    }

    /// Audit submission failures are never propagated (spec §7): they are
    /// logged and swallowed, independent of the decision path.
    async fn submit_audit(&self, event: &AuditEvent) {
        let url = format!("{}/mcp/policy/audit", self.base_url);
        if let Err(e) = self.http.post(&url).json(event).send().await {
            tracing::warn!(error = %e, "audit submission failed");
        }
    }
}
