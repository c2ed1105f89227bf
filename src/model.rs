//! Core data model: server specs, working-set configuration, capability
//! sets, and the policy/audit value types. Grounded on the shape of
//! `turbomcp-proxy::introspection::spec::ServerSpec` but reworked around
//! this gateway's entities (spec.md §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How a server is sourced and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// A local image run inside an isolated container.
    Server,
    /// A remote HTTP/SSE endpoint.
    Remote,
    /// POCI: the tool invocation itself, not the server, is the container unit.
    Poci,
}

/// Declared transport for a remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteTransport {
    Sse,
    Http,
    StreamableHttp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub transport: Option<RemoteTransport>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub providers: Vec<OAuthProvider>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProvider {
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretDecl {
    pub name: String,
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub template: String,
    #[serde(default)]
    pub read_only: bool,
}

/// A JSON-Schema-shaped config item, as declared by a server spec and
/// validated against user-supplied config (spec §9 "JSON Schema-shaped
/// config items").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    #[serde(flatten)]
    pub schema: Value,
}

/// Immutable description of one backend MCP server (spec §3 "Server Spec").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: Option<ServerType>,
    pub image: Option<String>,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Legacy alias for `remote.url` with an implied `sse` transport.
    pub sse_endpoint: Option<String>,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub secrets: Vec<SecretDecl>,
    #[serde(default)]
    pub env: Vec<EnvEntry>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    pub user: Option<String>,
    #[serde(default)]
    pub disable_network: bool,
    #[serde(default)]
    pub allow_hosts: Vec<String>,
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    #[serde(default)]
    pub long_lived: bool,
    /// Advertised subset of tools; empty means "all tools the backend exposes".
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub config: Vec<ConfigItem>,
    /// Explicit secrets provider namespace, e.g. secrets are emitted as
    /// `se://docker/mcp/<provider>_<name>` instead of `se://docker/mcp/<name>`.
    pub secrets_provider: Option<String>,
}

impl ServerSpec {
    /// Normalized server type used by policy inference (spec §4.4 L3).
    pub fn normalized_type(&self) -> &'static str {
        match self.server_type {
            Some(ServerType::Server) | Some(ServerType::Poci) => "registry",
            Some(ServerType::Remote) => "remote",
            None => {
                if self.sse_endpoint.is_some() || self.remote.url.is_some() {
                    "remote"
                } else if self.image.is_some() {
                    "image"
                } else {
                    ""
                }
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        self.sse_endpoint.is_some()
            || self.remote.url.is_some()
            || matches!(self.server_type, Some(ServerType::Remote))
    }
}

/// `(spec, evaluatedConfig, secrets)` for one server within a working set.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub spec: ServerSpec,
    pub evaluated_config: BTreeMap<String, Value>,
    pub secrets: HashMap<String, String>,
}

/// Per-server advertised tool allow-list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolFilters {
    pub server_tools: HashMap<String, Vec<String>>,
}

/// The full, atomically-installed configuration snapshot (spec §3
/// "Configuration"). Cloning is cheap relative to the cost of holding a
/// write lock across a handler call, which is the point: readers clone an
/// `Arc<Configuration>` and never block the reload path.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub server_names: Vec<String>,
    pub servers: HashMap<String, ServerSpec>,
    pub config: HashMap<String, BTreeMap<String, Value>>,
    pub tools: ToolFilters,
    pub secrets: HashMap<String, String>,
}

impl Configuration {
    pub fn server_config(&self, name: &str) -> Option<ServerConfig> {
        let spec = self.servers.get(name)?.clone();
        let evaluated_config = self.config.get(name).cloned().unwrap_or_default();
        let mut secrets = HashMap::new();
        for decl in &spec.secrets {
            let key = Self::namespaced(&spec, &decl.name);
            if let Some(v) = self.secrets.get(&key) {
                secrets.insert(decl.name.clone(), v.clone());
            }
        }
        Some(ServerConfig { spec, evaluated_config, secrets })
    }

    pub fn namespaced(spec: &ServerSpec, name: &str) -> String {
        match &spec.secrets_provider {
            Some(prefix) => format!("{prefix}_{name}"),
            None => name.to_string(),
        }
    }

    pub fn allowed_tools(&self, server: &str) -> Option<&Vec<String>> {
        self.tools.server_tools.get(server)
    }
}

/// Per-server set of advertised tools/prompts/resources/templates (spec §3
/// "Capability Set").
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    pub tools: BTreeSet<String>,
    pub prompts: BTreeSet<String>,
    pub resources: BTreeSet<String>,
    pub templates: BTreeSet<String>,
    /// Each tool's `readOnlyHint` annotation, as last reported by the
    /// backend (spec §4.5 step 4 "optional read-only hint derived from
    /// annotations"). Absent entries mean the backend didn't advertise one.
    pub tool_read_only_hints: BTreeMap<String, bool>,
}

/// A registered tool keyed by its globally unique registered name.
#[derive(Debug, Clone)]
pub struct ToolRegistration {
    pub server_name: String,
    pub tool: String,
    /// The name the tool is exposed as to clients. Equal to `tool` unless
    /// renamed for a `code-mode` aggregate (spec §4.9 "Tool registry naming").
    pub registered_name: String,
    /// For a `code-mode` aggregate, every server its script may call into.
    /// Empty for an ordinary single-server tool registration.
    pub union_servers: Vec<String>,
    /// The tool's `readOnlyHint` annotation, if the backend advertised one.
    pub read_only_hint: Option<bool>,
}
