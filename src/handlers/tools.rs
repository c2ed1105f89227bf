//! `tools/call` and `tools/list` handlers (spec §4.5, §6 "MCP surface").

use serde_json::Value;
use std::collections::HashMap;

use super::{authorize_and_acquire, release, timer, validate_params, CallContext, HandlerDeps};
use crate::error::{GatewayError, GatewayResult};
use crate::model::Configuration;
use crate::policy::request::Action;
use crate::telemetry::CallAttributes;

/// Forward a `tools/call` to the named server, honoring the server's tool
/// allow-list and the structural duplicate-key guard (spec Invariant 7).
pub async fn call_tool(
    deps: &HandlerDeps,
    configuration: &Configuration,
    server_name: &str,
    tool_name: &str,
    arguments: Option<HashMap<String, Value>>,
    ctx: &CallContext,
) -> GatewayResult<Value> {
    if let Some(allowed) = configuration.allowed_tools(server_name) {
        if !allowed.iter().any(|t| t == tool_name) {
            return Err(GatewayError::policy_denied(format!("tool '{tool_name}' not in allow-list for '{server_name}'")));
        }
    }

    let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
    validate_params("tools/call", &params)?;

    let (client, key, server_config) =
        authorize_and_acquire(deps, configuration, server_name, Action::Invoke, Some(tool_name), ctx).await?;

    let call_timer = timer(CallAttributes {
        server_name,
        server_type: server_config.spec.normalized_type(),
        tool_or_resource: tool_name,
        client_name: ctx.client_name.as_deref().unwrap_or(""),
    });

    let result = client.call_tool(tool_name, arguments).await;
    release(deps, &key, client).await;

    match result {
        Ok(value) => {
            call_timer.success();
            Ok(value)
        }
        Err(e) => {
            call_timer.failure(&e.sanitize());
            Err(e)
        }
    }
}

/// List tools aggregated across every server in the working set, scoped to
/// each server's own allow-list.
pub async fn list_tools(configuration: &Configuration, capabilities: &crate::capability::CapabilityTracker) -> Vec<String> {
    let mut names = Vec::new();
    for server_name in &configuration.server_names {
        let Some(set) = capabilities.get(server_name) else { continue };
        let allowed = configuration.allowed_tools(server_name);
        for tool in &set.tools {
            if allowed.map(|list| list.iter().any(|t| t == tool)).unwrap_or(true) {
                names.push(tool.clone());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_allow_list_rejects_names_outside_it() {
        let mut configuration = Configuration::default();
        configuration.tools.server_tools.insert("s".into(), vec!["only_this".into()]);
        let allowed = configuration.allowed_tools("s").unwrap();
        assert!(!allowed.iter().any(|t| t == "other"));
    }
}
