//! `resources/read` and `resources/list` handlers (spec §4.5, §6).

use turbomcp_protocol::types::ReadResourceResult;

use super::{authorize_and_acquire, release, timer, validate_params, CallContext, HandlerDeps};
use crate::error::GatewayResult;
use crate::model::Configuration;
use crate::policy::request::Action;
use crate::telemetry::CallAttributes;

pub async fn read_resource(
    deps: &HandlerDeps,
    configuration: &Configuration,
    server_name: &str,
    uri: &str,
    ctx: &CallContext,
) -> GatewayResult<ReadResourceResult> {
    let params = serde_json::json!({ "uri": uri });
    validate_params("resources/read", &params)?;

    let (client, key, server_config) =
        authorize_and_acquire(deps, configuration, server_name, Action::Invoke, Some(uri), ctx).await?;

    let call_timer = timer(CallAttributes {
        server_name,
        server_type: server_config.spec.normalized_type(),
        tool_or_resource: uri,
        client_name: ctx.client_name.as_deref().unwrap_or(""),
    });

    let result = client.read_resource(uri).await;
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

pub fn list_resources(configuration: &Configuration, capabilities: &crate::capability::CapabilityTracker) -> Vec<String> {
    configuration
        .server_names
        .iter()
        .filter_map(|s| capabilities.get(s))
        .flat_map(|set| set.resources.clone())
        .collect()
}
