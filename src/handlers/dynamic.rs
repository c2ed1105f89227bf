//! Dynamic management tools (spec §4.9, SPEC_FULL.md §E): `mcp-find`,
//! `mcp-add`, `mcp-remove`, `mcp-config-set`, `mcp-exec`,
//! `mcp-create-profile`, `mcp-activate-profile`, `code-mode`, and the
//! synthetic `record-counter`/`record-histogram`/`record-gauge` tools.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::dao::{CatalogReader, ProfileDao, ProfileRow};
use crate::config::reload::ConfigurationReloader;
use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{authorize_and_acquire, release, CallContext, HandlerDeps};
use crate::policy::request::Action;
use crate::profile::ProfileActivator;
use crate::telemetry::{record_counter, record_gauge, record_histogram};

/// Names handled by this module, distinguishing dynamic management calls
/// from ordinary forwarded `tools/call` invocations.
pub const DYNAMIC_TOOLS: &[&str] = &[
    "mcp-find",
    "mcp-add",
    "mcp-remove",
    "mcp-config-set",
    "mcp-exec",
    "mcp-create-profile",
    "mcp-activate-profile",
    "code-mode",
    "record-counter",
    "record-histogram",
    "record-gauge",
];

pub fn is_dynamic_tool(name: &str) -> bool {
    DYNAMIC_TOOLS.contains(&name)
}

/// Collaborators the dynamic tools need beyond the regular handler deps.
pub struct DynamicToolDeps {
    pub handler: HandlerDeps,
    pub dao: Arc<dyn ProfileDao>,
    pub catalog: Arc<dyn CatalogReader>,
    pub activator: Arc<ProfileActivator>,
    pub reloader: Arc<ConfigurationReloader>,
}

pub async fn dispatch(deps: &DynamicToolDeps, name: &str, arguments: Value, ctx: &CallContext) -> GatewayResult<Value> {
    match name {
        "mcp-find" => mcp_find(deps, arguments).await,
        "mcp-add" => mcp_add(deps, arguments, ctx).await,
        "mcp-remove" => mcp_remove(deps, arguments, ctx).await,
        "mcp-config-set" => mcp_config_set(deps, arguments, ctx).await,
        "mcp-exec" => mcp_exec(deps, arguments, ctx).await,
        "mcp-create-profile" => mcp_create_profile(deps, arguments).await,
        "mcp-activate-profile" => mcp_activate_profile(deps, arguments, ctx).await,
        "code-mode" => code_mode(deps, arguments, ctx).await,
        "record-counter" => synthetic_metric(arguments, record_counter),
        "record-histogram" => synthetic_metric(arguments, record_histogram),
        "record-gauge" => synthetic_metric(arguments, record_gauge),
        other => Err(GatewayError::configuration(format!("unknown dynamic tool '{other}'"))),
    }
}

async fn mcp_find(deps: &DynamicToolDeps, arguments: Value) -> GatewayResult<Value> {
    let query = arguments.get("query").and_then(Value::as_str).unwrap_or_default().to_lowercase();
    let servers = deps.catalog.all_servers().await?;
    let matches: Vec<&str> = servers.iter().filter(|s| s.name.to_lowercase().contains(&query)).map(|s| s.name.as_str()).collect();
    Ok(json!({ "servers": matches }))
}

async fn mcp_add(deps: &DynamicToolDeps, arguments: Value, ctx: &CallContext) -> GatewayResult<Value> {
    let server_name = arguments
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::configuration("mcp-add requires a 'name' argument"))?;
    let activate = arguments.get("activate").and_then(Value::as_bool).unwrap_or(true);

    let working_set = ctx.working_set.as_deref().unwrap_or(crate::config::resolver::DEFAULT_WORKING_SET);
    let mut row = deps.dao.find(working_set).await?.unwrap_or_default();
    if row.server_names.iter().any(|n| n == server_name) {
        return Err(GatewayError::configuration(format!("server '{server_name}' already in working set")));
    }

    let catalog_spec = deps
        .catalog
        .all_servers()
        .await?
        .into_iter()
        .find(|s| s.name == server_name)
        .ok_or_else(|| GatewayError::configuration(format!("server '{server_name}' not found in catalog")))?;

    row.server_names.push(server_name.to_string());
    row.servers.insert(server_name.to_string(), catalog_spec);

    if activate {
        deps.activator.activate(working_set, row).await?;
    } else {
        deps.dao.upsert(working_set, row).await?;
    }
    Ok(json!({ "added": server_name, "activated": activate }))
}

async fn mcp_remove(deps: &DynamicToolDeps, arguments: Value, ctx: &CallContext) -> GatewayResult<Value> {
    let server_name = arguments
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::configuration("mcp-remove requires a 'name' argument"))?;

    let working_set = ctx.working_set.as_deref().unwrap_or(crate::config::resolver::DEFAULT_WORKING_SET);
    let mut row = deps.dao.find(working_set).await?.unwrap_or_default();
    row.server_names.retain(|n| n != server_name);
    row.servers.remove(server_name);
    deps.activator.activate(working_set, row).await?;
    Ok(json!({ "removed": server_name }))
}

async fn mcp_config_set(deps: &DynamicToolDeps, arguments: Value, ctx: &CallContext) -> GatewayResult<Value> {
    let server_name = arguments
        .get("server")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::configuration("mcp-config-set requires a 'server' argument"))?;
    let values = arguments
        .get("config")
        .and_then(Value::as_object)
        .ok_or_else(|| GatewayError::configuration("mcp-config-set requires a 'config' object"))?
        .clone();

    let working_set = ctx.working_set.as_deref().unwrap_or(crate::config::resolver::DEFAULT_WORKING_SET);
    let mut row = deps.dao.find(working_set).await?.unwrap_or_default();
    if !row.server_names.iter().any(|n| n == server_name) {
        return Err(GatewayError::configuration(format!("server '{server_name}' not in working set")));
    }
    row.config.insert(server_name.to_string(), values);
    deps.activator.activate(working_set, row).await?;
    Ok(json!({ "configured": server_name }))
}

/// `mcp-exec` carries an extra policy check beyond the ordinary
/// `tools/call` pipeline: it dispatches to a tool by name alone, so it must
/// resolve that tool's *actual* owning server via the tool registry and
/// check policy against `(owningServer, name, Invoke)` — never the literal
/// string `"mcp-exec"` — or a deny on the target tool is never consulted
/// and `mcp-exec` becomes a way to reach any tool regardless of its own
/// policy decision (spec §4.5, §8 scenario 6).
async fn mcp_exec(deps: &DynamicToolDeps, arguments: Value, ctx: &CallContext) -> GatewayResult<Value> {
    let name = arguments
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::configuration("mcp-exec requires a 'name' argument"))?;

    let tool_arguments = parse_tool_arguments(arguments.get("arguments"))?;

    let registration = deps
        .handler
        .capabilities
        .resolve(name)
        .ok_or_else(|| GatewayError::configuration(format!("tool '{name}' is not registered")))?;

    if !registration.union_servers.is_empty() {
        return run_code_mode_script(deps, &registration, tool_arguments, ctx).await;
    }

    let configuration = deps.reloader.current();
    let (client, key, _server_config) = authorize_and_acquire(
        &deps.handler,
        &configuration,
        &registration.server_name,
        Action::Invoke,
        Some(name),
        ctx,
    )
    .await?;

    let result = client.call_tool(name, tool_arguments).await;
    release(&deps.handler, &key, client).await;
    result
}

/// `mcp-exec`'s `arguments` field is normally a JSON object, but (spec §9
/// design notes) may arrive as a JSON-encoded string for backward
/// compatibility; unescape it once before forwarding.
fn parse_tool_arguments(arguments: Option<&Value>) -> GatewayResult<Option<std::collections::HashMap<String, Value>>> {
    let value = match arguments {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| GatewayError::configuration(format!("'arguments' is a string but not valid JSON: {e}")))?,
        Some(other) => other.clone(),
    };
    match value {
        Value::Object(map) => Ok(Some(map.into_iter().collect())),
        Value::Null => Ok(None),
        other => Err(GatewayError::configuration(format!("'arguments' must be an object, got {other}"))),
    }
}

async fn mcp_create_profile(deps: &DynamicToolDeps, arguments: Value) -> GatewayResult<Value> {
    let name = arguments
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::configuration("mcp-create-profile requires a 'name' argument"))?;
    deps.dao.upsert(name, ProfileRow::default()).await?;
    Ok(json!({ "created": name }))
}

async fn mcp_activate_profile(deps: &DynamicToolDeps, arguments: Value, _ctx: &CallContext) -> GatewayResult<Value> {
    let name = arguments
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::configuration("mcp-activate-profile requires a 'name' argument"))?;
    let row = deps.dao.find(name).await?.ok_or_else(|| GatewayError::configuration(format!("profile '{name}' not found")))?;
    deps.activator.activate(name, row).await?;
    Ok(json!({ "activated": name }))
}

/// `code-mode` registers a new aggregate tool `code-mode-<name>` with
/// script-time access to the union of `servers`' tools (spec §4.9 "Tool
/// registry naming"). Registration fails deterministically on a name
/// collision. The registered tool is invoked through `mcp-exec`, which
/// runs its script as a sequence of `{server, tool, arguments}` steps, each
/// re-checked against policy and confined to this union.
async fn code_mode(deps: &DynamicToolDeps, arguments: Value, _ctx: &CallContext) -> GatewayResult<Value> {
    let servers: Vec<String> = arguments
        .get("servers")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::configuration("code-mode requires a 'servers' array"))?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| GatewayError::configuration("code-mode 'servers' must be an array of strings"))?;
    let name = arguments
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::configuration("code-mode requires a 'name' argument"))?;

    let configuration = deps.reloader.current();
    for server_name in &servers {
        if configuration.server_config(server_name).is_none() {
            return Err(GatewayError::configuration(format!("unknown server '{server_name}'")));
        }
    }

    let registered_name = format!("code-mode-{name}");
    deps.handler.capabilities.register_aggregate(registered_name.clone(), name.to_string(), servers.clone())?;
    Ok(json!({ "registered_name": registered_name, "servers": servers }))
}

/// Run a `code-mode` aggregate's script: a sequence of `{server, tool,
/// arguments}` steps. Each step is authorized and dispatched exactly like
/// an ordinary `tools/call`, restricted to the aggregate's registered
/// union so a script cannot reach a server it wasn't registered against.
async fn run_code_mode_script(
    deps: &DynamicToolDeps,
    registration: &crate::model::ToolRegistration,
    tool_arguments: Option<std::collections::HashMap<String, Value>>,
    ctx: &CallContext,
) -> GatewayResult<Value> {
    let steps = tool_arguments
        .as_ref()
        .and_then(|m| m.get("script"))
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::configuration("code-mode tool requires an 'arguments.script' array"))?
        .clone();

    let configuration = deps.reloader.current();
    let mut results = Vec::with_capacity(steps.len());
    for step in steps {
        let step_server = step
            .get("server")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::configuration("script step requires a 'server'"))?;
        let step_tool = step
            .get("tool")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::configuration("script step requires a 'tool'"))?;
        if !registration.union_servers.iter().any(|s| s == step_server) {
            return Err(GatewayError::configuration(format!(
                "script step targets server '{step_server}', outside this aggregate's union {:?}",
                registration.union_servers
            )));
        }

        let step_arguments = parse_tool_arguments(step.get("arguments"))?;
        let (client, key, _server_config) =
            authorize_and_acquire(&deps.handler, &configuration, step_server, Action::Invoke, Some(step_tool), ctx).await?;
        let result = client.call_tool(step_tool, step_arguments).await;
        release(&deps.handler, &key, client).await;
        results.push(result?);
    }
    Ok(json!({ "results": results }))
}

fn synthetic_metric(arguments: Value, record: fn(&str, f64, &[(&str, &str)])) -> GatewayResult<Value> {
    let name = arguments
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::configuration("metric tools require a 'name' argument"))?;
    let value = arguments.get("value").and_then(Value::as_f64).unwrap_or(0.0);
    record(name, value, &[]);
    Ok(json!({ "recorded": name }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_every_declared_dynamic_tool() {
        for name in DYNAMIC_TOOLS {
            assert!(is_dynamic_tool(name));
        }
        assert!(!is_dynamic_tool("tools/call"));
    }
}
