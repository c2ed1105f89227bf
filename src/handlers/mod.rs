//! H4 — Handler layer: the five-step pipeline spec §4.5 describes for every
//! forwarded call (lookup server config → telemetry span/counter → policy
//! check + audit → pool acquire → forward + release), plus dynamic
//! management tools (§4.9, SPEC_FULL.md §E).

pub mod dynamic;
pub mod prompts;
pub mod resources;
pub mod tools;

use std::sync::Arc;

use crate::capability::CapabilityTracker;
use crate::config::reload::ConfigurationReloader;
use crate::error::{GatewayError, GatewayResult};
use crate::model::{Configuration, ServerConfig};
use crate::policy::audit::{AuditEvent, AuditSink};
use crate::policy::client::PolicyEvaluator;
use crate::policy::request::{build, Action};
use crate::pool::client_pool::{ClientConfig, ClientPool, PoolKey};
use crate::telemetry::{call_span, CallAttributes, CallTimer};
use crate::validation;

/// Identity of the requesting session/client, threaded through every
/// handler call for pool keying, audit attribution, and telemetry.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub session_ref: String,
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    pub catalog: Option<String>,
    pub working_set: Option<String>,
}

/// Shared collaborators every handler needs. Cheap to clone: everything
/// inside is already an `Arc`.
#[derive(Clone)]
pub struct HandlerDeps {
    pub reloader: Arc<ConfigurationReloader>,
    pub pool: Arc<ClientPool>,
    pub capabilities: Arc<CapabilityTracker>,
    pub policy: Arc<dyn PolicyEvaluator>,
    pub audit: AuditSink,
}

/// Steps 1–4 of spec §4.5's pipeline, shared by `tools/call`,
/// `prompts/get`, and `resources/read`: resolve the server config, check
/// policy (auditing unconditionally), then acquire a backend client.
/// Returns the acquired client plus the pool key the caller must release
/// it with.
pub async fn authorize_and_acquire(
    deps: &HandlerDeps,
    configuration: &Configuration,
    server_name: &str,
    action: Action,
    tool: Option<&str>,
    ctx: &CallContext,
) -> GatewayResult<(crate::backend::BackendClient, PoolKey, ServerConfig)> {
    let server_config = configuration
        .server_config(server_name)
        .ok_or_else(|| GatewayError::configuration(format!("unknown server '{server_name}'")))?;

    let span = call_span(&CallAttributes {
        server_name,
        server_type: server_config.spec.normalized_type(),
        tool_or_resource: tool.unwrap_or(server_name),
        client_name: ctx.client_name.as_deref().unwrap_or(""),
    });
    let _entered = span.enter();

    let request = build(&server_config.spec, action, tool, ctx.catalog.as_deref(), ctx.working_set.as_deref());
    let decision = match deps.policy.evaluate(&request).await {
        Ok(decision) => decision,
        Err(e) => crate::policy::PolicyDecision::error(e.sanitize()),
    };

    deps.audit.submit(AuditEvent::build(&request, &decision, ctx.client_name.clone(), ctx.client_version.clone()));

    if decision.is_refused() {
        let reason = decision.error.clone().or(decision.reason.clone()).unwrap_or_else(|| "denied".to_string());
        return Err(GatewayError::policy_denied(reason));
    }

    let key = PoolKey { server_name: server_name.to_string(), session_ref: ctx.session_ref.clone() };
    let read_only_hint = tool.and_then(|t| deps.capabilities.read_only_hint(t));
    let client_config = ClientConfig { session_ref: ctx.session_ref.clone(), read_only_hint };
    let client = deps.pool.acquire_client(server_config.clone(), client_config).await?;
    Ok((client, key, server_config))
}

/// Step 5: release the client back to the pool after forwarding completes,
/// logging success or failure via the shared timer helper.
pub async fn release(deps: &HandlerDeps, key: &PoolKey, client: crate::backend::BackendClient) {
    deps.pool.release_client(key, client).await;
}

pub(crate) fn validate_params(method: &str, params: &serde_json::Value) -> GatewayResult<()> {
    validation::validate(method, params)
}

pub(crate) fn timer<'a>(attrs: CallAttributes<'a>) -> CallTimer<'a> {
    CallTimer::start(attrs)
}
