//! Top-level wiring: owns the client pool, configuration reloader,
//! capability tracker, policy client, audit worker, and profile activator,
//! and dispatches incoming JSON-RPC requests to the handler layer (spec
//! §9 "cyclic structures" — the gateway owns the pool; the pool is only
//! ever handed a callback-shaped view of it, never an owning reference
//! back).

use serde_json::{json, Value};
use std::sync::Arc;

use crate::capability::CapabilityTracker;
use crate::config::dao::{CatalogReader, OciSnapshotResolver, ProfileDao};
use crate::config::options::GatewayOptions;
use crate::config::reload::ConfigurationReloader;
use crate::config::resolver::{resolve, ResolveInput, DEFAULT_WORKING_SET};
use crate::container::DockerImagePuller;
use crate::error::{GatewayError, GatewayResult};
use crate::handlers::dynamic::{self, DynamicToolDeps};
use crate::handlers::{prompts, resources, tools, CallContext, HandlerDeps};
use crate::policy::audit::AuditWorker;
use crate::policy::client::{PolicyClient, PolicyEvaluator};
use crate::pool::client_pool::ClientPool;
use crate::profile::ProfileActivator;
use crate::secrets::SecretsEngineClient;

pub struct Gateway {
    reloader: Arc<ConfigurationReloader>,
    pool: Arc<ClientPool>,
    capabilities: Arc<CapabilityTracker>,
    policy: Arc<dyn PolicyEvaluator>,
    audit: AuditWorker,
    handler_deps: HandlerDeps,
    dynamic_deps: DynamicToolDeps,
}

impl Gateway {
    pub async fn new(
        options: GatewayOptions,
        dao: Arc<dyn ProfileDao>,
        oci: Arc<dyn OciSnapshotResolver>,
        catalog: Arc<dyn CatalogReader>,
    ) -> GatewayResult<Self> {
        let configuration = resolve(ResolveInput {
            working_set: DEFAULT_WORKING_SET,
            dynamic_discovery: false,
            dao: dao.clone(),
            oci: oci.clone(),
            catalog: catalog.clone(),
        })
        .await?;

        let reloader = Arc::new(ConfigurationReloader::new(configuration));
        let pool = Arc::new(ClientPool::new(options.long_lived, options.as_container_options()));
        let capabilities = Arc::new(CapabilityTracker::new());
        let policy: Arc<dyn PolicyEvaluator> = Arc::new(PolicyClient::new(options.policy_base_url.clone())?);
        let (audit_sink, audit_worker) = AuditWorker::spawn(policy.clone());

        let handler_deps = HandlerDeps { reloader: reloader.clone(), pool: pool.clone(), capabilities: capabilities.clone(), policy: policy.clone(), audit: audit_sink };

        let secrets = SecretsEngineClient::new()?;
        let activator = Arc::new(ProfileActivator::new(
            dao.clone(),
            oci,
            catalog.clone(),
            secrets,
            reloader.clone(),
            capabilities.clone(),
            Arc::new(DockerImagePuller),
        ));
        let dynamic_deps = DynamicToolDeps { handler: handler_deps.clone(), dao, catalog, activator, reloader: reloader.clone() };

        Ok(Self { reloader, pool, capabilities, policy, audit: audit_worker, handler_deps, dynamic_deps })
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn capabilities(&self) -> &Arc<CapabilityTracker> {
        &self.capabilities
    }

    pub fn policy(&self) -> &Arc<dyn PolicyEvaluator> {
        &self.policy
    }

    pub async fn shutdown(self) {
        self.pool.close().await;
        self.audit.shutdown();
    }

    /// Dispatch one JSON-RPC request, returning a JSON-RPC-shaped response.
    /// Handler errors are sanitized before being embedded (spec §7): no
    /// internal detail crosses the gateway boundary.
    pub async fn handle_json_rpc(&self, request: Value) -> GatewayResult<Value> {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or(json!({}));

        let result = self.route(method, params).await;
        Ok(match result {
            Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
            Err(e) => json!({ "jsonrpc": "2.0", "id": id, "error": { "message": e.sanitize() } }),
        })
    }

    async fn route(&self, method: &str, params: Value) -> GatewayResult<Value> {
        let ctx = context_from_params(&params);
        let configuration = self.reloader.current();

        match method {
            "tools/list" => Ok(json!({ "tools": tools::list_tools(&configuration, &self.capabilities).await })),
            "prompts/list" => Ok(json!({ "prompts": prompts::list_prompts(&configuration, &self.capabilities) })),
            "resources/list" => Ok(json!({ "resources": resources::list_resources(&configuration, &self.capabilities) })),
            "tools/call" => {
                let tool_name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::configuration("tools/call requires 'name'"))?;
                let arguments = params.get("arguments").and_then(Value::as_object).map(|m| m.clone().into_iter().collect());
                let server_name = params
                    .get("server")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::configuration("tools/call requires 'server'"))?;

                if dynamic::is_dynamic_tool(tool_name) {
                    dynamic::dispatch(&self.dynamic_deps, tool_name, params.get("arguments").cloned().unwrap_or(json!({})), &ctx).await
                } else {
                    tools::call_tool(&self.handler_deps, &configuration, server_name, tool_name, arguments, &ctx).await
                }
            }
            "prompts/get" => {
                let server_name = params
                    .get("server")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::configuration("prompts/get requires 'server'"))?;
                let prompt_name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::configuration("prompts/get requires 'name'"))?;
                let arguments = params.get("arguments").and_then(Value::as_object).map(|m| m.clone().into_iter().collect());
                let result = prompts::get_prompt(&self.handler_deps, &configuration, server_name, prompt_name, arguments, &ctx).await?;
                serde_json::to_value(result).map_err(GatewayError::from)
            }
            "resources/read" => {
                let server_name = params
                    .get("server")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GatewayError::configuration("resources/read requires 'server'"))?;
                let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| GatewayError::configuration("resources/read requires 'uri'"))?;
                let result = resources::read_resource(&self.handler_deps, &configuration, server_name, uri, &ctx).await?;
                serde_json::to_value(result).map_err(GatewayError::from)
            }
            other => Err(GatewayError::configuration(format!("unsupported method '{other}'"))),
        }
    }
}

fn context_from_params(params: &Value) -> CallContext {
    CallContext {
        session_ref: params.get("session_ref").and_then(Value::as_str).unwrap_or_default().to_string(),
        client_name: params.get("client_name").and_then(Value::as_str).map(str::to_string),
        client_version: params.get("client_version").and_then(Value::as_str).map(str::to_string),
        catalog: params.get("catalog").and_then(Value::as_str).map(str::to_string),
        working_set: params.get("working_set").and_then(Value::as_str).map(str::to_string),
    }
}
