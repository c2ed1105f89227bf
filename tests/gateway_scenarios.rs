//! End-to-end scenario tests against the public API, composing the
//! configuration, policy, and profile-activation layers the way a real
//! client would drive them. Scenarios that would require a live backend
//! connection (container or remote transport) are out of scope here; the
//! pipeline up to and including pool acquisition is still exercised, since
//! a policy denial short-circuits before any backend is dialed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mcp_gateway::capability::CapabilityTracker;
use mcp_gateway::config::dao::{InMemoryCatalog, InMemoryProfileDao, NullImagePuller, PassthroughOciResolver, ProfileRow};
use mcp_gateway::config::reload::ConfigurationReloader;
use mcp_gateway::config::resolver::{resolve, ResolveInput, DEFAULT_WORKING_SET};
use mcp_gateway::container::Options as ContainerOptions;
use mcp_gateway::error::GatewayError;
use mcp_gateway::handlers::dynamic::{self, DynamicToolDeps};
use mcp_gateway::handlers::{authorize_and_acquire, CallContext, HandlerDeps};
use mcp_gateway::model::{ConfigItem, SecretDecl, ServerSpec, ServerType};
use mcp_gateway::policy::audit::{AuditEvent, AuditWorker};
use mcp_gateway::policy::client::PolicyEvaluator;
use mcp_gateway::policy::request::Action;
use mcp_gateway::policy::{PolicyDecision, PolicyRequest};
use mcp_gateway::pool::client_pool::ClientPool;
use mcp_gateway::profile::ProfileActivator;
use mcp_gateway::secrets::SecretsEngineClient;
use mcp_gateway::validation;

/// A policy evaluator under test control: denies everything matching a
/// server name, allows everything else, and counts audit submissions so
/// fail-closed behavior can be asserted on.
struct ScriptedPolicy {
    deny_server: Option<String>,
    audited: AtomicUsize,
}

impl ScriptedPolicy {
    fn allow_all() -> Arc<Self> {
        Arc::new(Self { deny_server: None, audited: AtomicUsize::new(0) })
    }

    fn deny(server: &str) -> Arc<Self> {
        Arc::new(Self { deny_server: Some(server.to_string()), audited: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl PolicyEvaluator for ScriptedPolicy {
    async fn evaluate(&self, request: &PolicyRequest) -> mcp_gateway::error::GatewayResult<PolicyDecision> {
        match &self.deny_server {
            Some(name) if name == &request.server => Ok(PolicyDecision::deny("denied by policy under test")),
            _ => Ok(PolicyDecision::allow()),
        }
    }

    async fn evaluate_batch(&self, requests: &[PolicyRequest]) -> mcp_gateway::error::GatewayResult<Vec<PolicyDecision>> {
        let mut out = Vec::with_capacity(requests.len());
        for r in requests {
            out.push(self.evaluate(r).await?);
        }
        Ok(out)
    }

    async fn submit_audit(&self, _event: &AuditEvent) {
        self.audited.fetch_add(1, Ordering::SeqCst);
    }
}

fn remote_spec(name: &str) -> ServerSpec {
    ServerSpec {
        name: name.into(),
        server_type: Some(ServerType::Server),
        image: Some(format!("{name}/mcp")),
        remote: Default::default(),
        sse_endpoint: None,
        oauth: Default::default(),
        secrets: vec![],
        env: vec![],
        command: vec![],
        volumes: vec![],
        user: None,
        disable_network: false,
        allow_hosts: vec![],
        extra_hosts: vec![],
        long_lived: false,
        tools: vec![],
        config: vec![],
        secrets_provider: None,
    }
}

fn handler_deps(policy: Arc<dyn PolicyEvaluator>) -> HandlerDeps {
    let (audit, worker) = AuditWorker::spawn(policy.clone());
    // The worker task is intentionally leaked for the lifetime of the test
    // process; tests run single-shot and the process exits regardless.
    std::mem::forget(worker);
    HandlerDeps {
        reloader: Arc::new(ConfigurationReloader::new(Default::default())),
        pool: Arc::new(ClientPool::new(false, ContainerOptions::default())),
        capabilities: Arc::new(CapabilityTracker::new()),
        policy,
        audit,
    }
}

/// Scenario 6 (spec §8): `mcp-exec` carries its own policy check, so a deny
/// on the target server can't be bypassed by routing the call through the
/// dynamic-tool path instead of a plain `tools/call`.
#[tokio::test]
async fn mcp_exec_is_denied_when_the_underlying_server_is_denied() {
    let policy: Arc<dyn PolicyEvaluator> = ScriptedPolicy::deny("sandbox");
    let deps = handler_deps(policy);

    let dao = Arc::new(InMemoryProfileDao::new());
    let mut row = ProfileRow { server_names: vec!["sandbox".into()], ..Default::default() };
    row.servers.insert("sandbox".into(), remote_spec("sandbox"));
    dao.seed(DEFAULT_WORKING_SET, row);

    let configuration = resolve(ResolveInput {
        working_set: DEFAULT_WORKING_SET,
        dynamic_discovery: false,
        dao: dao.clone(),
        oci: Arc::new(PassthroughOciResolver),
        catalog: Arc::new(InMemoryCatalog::new(vec![])),
    })
    .await
    .unwrap();
    deps.reloader.install(configuration);

    let activator = Arc::new(ProfileActivator::new(
        dao.clone(),
        Arc::new(PassthroughOciResolver),
        Arc::new(InMemoryCatalog::new(vec![])),
        SecretsEngineClient::new().unwrap(),
        deps.reloader.clone(),
        deps.capabilities.clone(),
        Arc::new(NullImagePuller),
    ));
    // The registry entry a real capability refresh would have produced:
    // `rm` is owned by `sandbox`, which the scripted policy denies.
    let mut set = mcp_gateway::model::CapabilitySet::default();
    set.tools.insert("rm".to_string());
    deps.capabilities.apply("sandbox", set).unwrap();

    let dynamic_deps = DynamicToolDeps {
        handler: deps,
        dao: dao.clone(),
        catalog: Arc::new(InMemoryCatalog::new(vec![])),
        activator,
        reloader: Arc::new(ConfigurationReloader::new(Default::default())),
    };

    let ctx = CallContext::default();
    let arguments = serde_json::json!({ "name": "rm", "arguments": {"path": "/"} });
    let result = dynamic::dispatch(&dynamic_deps, "mcp-exec", arguments, &ctx).await;

    let err = result.expect_err("mcp-exec must not bypass the target tool's owning server's policy denial");
    assert!(matches!(err, GatewayError::Policy { .. }));
}

/// `mcp-exec` resolves its target through the tool registry rather than
/// trusting a caller-supplied server name, so a request naming an
/// unregistered tool is rejected before any policy check or backend dial.
#[tokio::test]
async fn mcp_exec_rejects_an_unregistered_tool_name() {
    let policy: Arc<dyn PolicyEvaluator> = ScriptedPolicy::allow_all();
    let deps = handler_deps(policy);
    let dynamic_deps = DynamicToolDeps {
        handler: deps,
        dao: Arc::new(InMemoryProfileDao::new()),
        catalog: Arc::new(InMemoryCatalog::new(vec![])),
        activator: Arc::new(ProfileActivator::new(
            Arc::new(InMemoryProfileDao::new()),
            Arc::new(PassthroughOciResolver),
            Arc::new(InMemoryCatalog::new(vec![])),
            SecretsEngineClient::new().unwrap(),
            Arc::new(ConfigurationReloader::new(Default::default())),
            Arc::new(CapabilityTracker::new()),
            Arc::new(NullImagePuller),
        )),
        reloader: Arc::new(ConfigurationReloader::new(Default::default())),
    };

    let ctx = CallContext::default();
    let arguments = serde_json::json!({ "name": "never-registered" });
    let err = dynamic::dispatch(&dynamic_deps, "mcp-exec", arguments, &ctx).await.unwrap_err();
    assert!(matches!(err, GatewayError::Configuration { .. }));
}

/// `code-mode` registers a new aggregate tool over the union of its
/// declared servers, and a colliding registered name is a deterministic
/// configuration error rather than a silent overwrite.
#[tokio::test]
async fn code_mode_registers_an_aggregate_and_rejects_name_collisions() {
    let policy: Arc<dyn PolicyEvaluator> = ScriptedPolicy::allow_all();
    let deps = handler_deps(policy);

    let dao = Arc::new(InMemoryProfileDao::new());
    let mut row = ProfileRow { server_names: vec!["a".into(), "b".into()], ..Default::default() };
    row.servers.insert("a".into(), remote_spec("a"));
    row.servers.insert("b".into(), remote_spec("b"));
    dao.seed(DEFAULT_WORKING_SET, row);
    let configuration = resolve(ResolveInput {
        working_set: DEFAULT_WORKING_SET,
        dynamic_discovery: false,
        dao: dao.clone(),
        oci: Arc::new(PassthroughOciResolver),
        catalog: Arc::new(InMemoryCatalog::new(vec![])),
    })
    .await
    .unwrap();
    deps.reloader.install(configuration.clone());
    let dynamic_reloader = Arc::new(ConfigurationReloader::new(configuration));

    let dynamic_deps = DynamicToolDeps {
        handler: deps,
        dao: dao.clone(),
        catalog: Arc::new(InMemoryCatalog::new(vec![])),
        activator: Arc::new(ProfileActivator::new(
            dao,
            Arc::new(PassthroughOciResolver),
            Arc::new(InMemoryCatalog::new(vec![])),
            SecretsEngineClient::new().unwrap(),
            Arc::new(ConfigurationReloader::new(Default::default())),
            Arc::new(CapabilityTracker::new()),
            Arc::new(NullImagePuller),
        )),
        reloader: dynamic_reloader,
    };

    let ctx = CallContext::default();
    let arguments = serde_json::json!({ "servers": ["a", "b"], "name": "demo" });
    let registered = dynamic::dispatch(&dynamic_deps, "code-mode", arguments.clone(), &ctx).await.unwrap();
    assert_eq!(registered["registered_name"], "code-mode-demo");

    let collision = dynamic::dispatch(&dynamic_deps, "code-mode", arguments, &ctx).await.unwrap_err();
    assert!(matches!(collision, GatewayError::Configuration { .. }));
}

/// `mcp-add`/`mcp-remove` read the documented `name` key (not `server`),
/// and `mcp-add`'s `activate` flag defaults to `true` but can be set to
/// `false` to persist a server without activating it immediately.
#[tokio::test]
async fn mcp_add_honors_the_activate_flag() {
    let policy: Arc<dyn PolicyEvaluator> = ScriptedPolicy::allow_all();
    let deps = handler_deps(policy);
    let dao = Arc::new(InMemoryProfileDao::new());
    let catalog = Arc::new(InMemoryCatalog::new(vec![remote_spec("grafana")]));
    let reloader = Arc::new(ConfigurationReloader::new(Default::default()));
    let dynamic_deps = DynamicToolDeps {
        handler: deps,
        dao: dao.clone(),
        catalog: catalog.clone(),
        activator: Arc::new(ProfileActivator::new(
            dao.clone(),
            Arc::new(PassthroughOciResolver),
            catalog,
            SecretsEngineClient::new().unwrap(),
            reloader.clone(),
            Arc::new(CapabilityTracker::new()),
            Arc::new(NullImagePuller),
        )),
        reloader,
    };

    let ctx = CallContext::default();
    let arguments = serde_json::json!({ "name": "grafana", "activate": false });
    let result = dynamic::dispatch(&dynamic_deps, "mcp-add", arguments, &ctx).await.unwrap();
    assert_eq!(result["added"], "grafana");
    assert_eq!(result["activated"], false);

    let row = dao.find(DEFAULT_WORKING_SET).await.unwrap().expect("server persisted even though not activated");
    assert!(row.server_names.contains(&"grafana".to_string()));
    assert!(
        dynamic_deps.reloader.current().server_names.is_empty(),
        "activate: false must not install the server into the live configuration"
    );
}

/// Scenario 3 (spec §8): a `tools/call` whose argument tree smuggles a
/// second value past a case-sensitive filter via a case-variant key is
/// rejected before it ever reaches policy evaluation or the backend.
#[test]
fn duplicate_case_variant_keys_are_rejected_before_dispatch() {
    let params = serde_json::json!({ "name": "read_file", "arguments": {"path": "/etc/passwd", "Path": "/etc/shadow"} });
    let err = validation::validate("tools/call", &params).unwrap_err();
    assert!(matches!(err, GatewayError::Validation { .. }));
}

/// Scenario 5 (spec §8): profile activation is all-or-nothing. A profile
/// whose declared secret is unresolvable must install nothing at all — the
/// previously active configuration stays untouched.
#[tokio::test]
async fn profile_activation_is_all_or_nothing() {
    let dao = Arc::new(InMemoryProfileDao::new());
    let reloader = Arc::new(ConfigurationReloader::new(Default::default()));
    let activator = ProfileActivator::new(
        dao.clone(),
        Arc::new(PassthroughOciResolver),
        Arc::new(InMemoryCatalog::new(vec![])),
        SecretsEngineClient::new().unwrap(),
        reloader.clone(),
        Arc::new(CapabilityTracker::new()),
        Arc::new(NullImagePuller),
    );

    let mut needs_secret = remote_spec("grafana");
    needs_secret.secrets = vec![SecretDecl { name: "api_key".into(), env: "GRAFANA_API_KEY".into() }];
    needs_secret.config = vec![ConfigItem { name: "timeout".into(), schema: serde_json::json!({"type": "integer"}) }];

    let mut row = ProfileRow { server_names: vec!["grafana".into()], ..Default::default() };
    row.servers.insert("grafana".into(), needs_secret);

    let result = activator.activate("team-a", row).await;
    assert!(result.is_err(), "activation must fail when a declared secret is unresolvable");
    assert!(reloader.current().server_names.is_empty(), "no partial install on a failed pre-flight");
    assert!(dao.find("team-a").await.unwrap().is_none(), "the profile row itself must not be persisted either");
}

/// Scenario 4 (spec §8): a batch policy evaluation that returns a mismatched
/// number of decisions denies every request in the batch rather than
/// mis-aligning decisions to requests.
#[test]
fn batch_length_mismatch_fails_closed_for_every_request() {
    use mcp_gateway::policy::batch::normalize_batch;
    let requests: Vec<PolicyRequest> = (0..3)
        .map(|i| PolicyRequest {
            catalog: None,
            working_set: None,
            server: format!("s{i}"),
            server_type: "image".into(),
            server_source: "i".into(),
            transport: "stdio".into(),
            tool: None,
            action: Action::Invoke,
            target: None,
        })
        .collect();
    let short = vec![PolicyDecision::allow()];
    let normalized = normalize_batch(&requests, Ok(short));
    assert_eq!(normalized.len(), 3);
    assert!(normalized.iter().all(PolicyDecision::is_refused));
}

/// A denied call for an ordinary (non-dynamic) tool still reaches the audit
/// pipeline exactly once, satisfying the "always audited, fail-closed"
/// invariant even when no backend is ever dialed.
#[tokio::test]
async fn denied_calls_are_audited_without_touching_the_backend() {
    let policy = ScriptedPolicy::deny("sandbox");
    let (audit, worker) = AuditWorker::spawn(policy.clone());
    let deps = HandlerDeps {
        reloader: Arc::new(ConfigurationReloader::new(Default::default())),
        pool: Arc::new(ClientPool::new(false, ContainerOptions::default())),
        capabilities: Arc::new(CapabilityTracker::new()),
        policy: policy.clone(),
        audit,
    };

    let dao = Arc::new(InMemoryProfileDao::new());
    let mut row = ProfileRow { server_names: vec!["sandbox".into()], ..Default::default() };
    row.servers.insert("sandbox".into(), remote_spec("sandbox"));
    dao.seed(DEFAULT_WORKING_SET, row);
    let configuration = resolve(ResolveInput {
        working_set: DEFAULT_WORKING_SET,
        dynamic_discovery: false,
        dao,
        oci: Arc::new(PassthroughOciResolver),
        catalog: Arc::new(InMemoryCatalog::new(vec![])),
    })
    .await
    .unwrap();

    let ctx = CallContext::default();
    let result = authorize_and_acquire(&deps, &configuration, "sandbox", Action::Invoke, Some("read"), &ctx).await;
    assert!(result.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(policy.audited.load(Ordering::SeqCst), 1);
    worker.shutdown();
}

/// Duplicate server names within one profile row are rejected at resolution
/// time rather than silently keeping the last (or first) definition.
#[tokio::test]
async fn duplicate_server_names_in_a_profile_are_a_configuration_error() {
    let dao = Arc::new(InMemoryProfileDao::new());
    let mut row = ProfileRow { server_names: vec!["dup".into(), "dup".into()], ..Default::default() };
    row.servers.insert("dup".into(), remote_spec("dup"));
    dao.seed(DEFAULT_WORKING_SET, row);

    let err = resolve(ResolveInput {
        working_set: DEFAULT_WORKING_SET,
        dynamic_discovery: false,
        dao,
        oci: Arc::new(PassthroughOciResolver),
        catalog: Arc::new(InMemoryCatalog::new(vec![])),
    })
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::Configuration { .. }));
}
