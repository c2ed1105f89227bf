//! `prompts/get` and `prompts/list` handlers (spec §4.5, §6).

use serde_json::Value;
use std::collections::HashMap;
use turbomcp_protocol::types::GetPromptResult;

use super::{authorize_and_acquire, release, timer, validate_params, CallContext, HandlerDeps};
use crate::error::GatewayResult;
use crate::model::Configuration;
use crate::policy::request::Action;
use crate::telemetry::CallAttributes;

pub async fn get_prompt(
    deps: &HandlerDeps,
    configuration: &Configuration,
    server_name: &str,
    prompt_name: &str,
    arguments: Option<HashMap<String, Value>>,
    ctx: &CallContext,
) -> GatewayResult<GetPromptResult> {
    let params = serde_json::json!({ "name": prompt_name, "arguments": arguments });
    validate_params("prompts/get", &params)?;

    let (client, key, server_config) =
        authorize_and_acquire(deps, configuration, server_name, Action::Prompt, Some(prompt_name), ctx).await?;

    let call_timer = timer(CallAttributes {
        server_name,
        server_type: server_config.spec.normalized_type(),
        tool_or_resource: prompt_name,
        client_name: ctx.client_name.as_deref().unwrap_or(""),
    });

    let result = client.get_prompt(prompt_name, arguments).await;
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

pub fn list_prompts(configuration: &Configuration, capabilities: &crate::capability::CapabilityTracker) -> Vec<String> {
    configuration
        .server_names
        .iter()
        .filter_map(|s| capabilities.get(s))
        .flat_map(|set| set.prompts.clone())
        .collect()
}
