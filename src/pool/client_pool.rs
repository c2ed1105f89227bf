//! H1 — Client pool: caches clients keyed by `(serverName, sessionRef)`,
//! honoring long-lived vs ephemeral lifetimes; invalidates on OAuth
//! change; closes all on shutdown (spec §4.2, §5, §8 quantified invariants,
//! §9 design notes on cyclic structures).
//!
//! Grounded on the RW-mutex + dashmap concurrency discipline the teacher
//! uses throughout `turbomcp-server` (e.g. `capabilitiesMu`): reads take a
//! shared lock, mutations take a write lock, and the lock is never held
//! across an `.await` that talks to a backend.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::BackendClient;
use crate::container::{self, Options as ContainerOptions};
use crate::error::{GatewayError, GatewayResult};
use crate::model::ServerConfig;
use crate::pool::client_getter::ClientGetter;
use crate::pool::proxy_runner::ProxyRunner;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub server_name: String,
    pub session_ref: String,
}

/// Per-call context threaded through acquisition: which session is
/// asking, and (for tools) an optional read-only hint derived from
/// annotations (spec §4.5 step 4).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub session_ref: String,
    pub read_only_hint: Option<bool>,
}

struct PoolEntry {
    getter: Arc<ClientGetter>,
    server_config: ServerConfig,
    client_config: ClientConfig,
}

/// The client pool. `kept_clients` only ever holds entries that are both
/// long-lived *and* bound to a non-empty session (spec §3 "Client Pool
/// Entry"); everything else is acquired fresh and released at call return.
pub struct ClientPool {
    kept_clients: RwLock<HashMap<PoolKey, Arc<PoolEntry>>>,
    /// In-flight (not-yet-retained-or-discarded) getters for ephemeral
    /// acquisitions, so concurrent callers for the same ephemeral key still
    /// coalesce onto one initialization even though the entry isn't kept.
    transient_getters: DashMap<PoolKey, Arc<ClientGetter>>,
    global_long_lived: bool,
    networks: RwLock<Vec<String>>,
    container_options: ContainerOptions,
    /// A dedicated root context that only cancels on `Close()` (spec §4.9
    /// "Long-lived but cancel-detached" initialization). Modeled as a
    /// `CancellationToken` rather than a literal background context.
    root: tokio_util::sync::CancellationToken,
}

impl ClientPool {
    pub fn new(global_long_lived: bool, container_options: ContainerOptions) -> Self {
        Self {
            kept_clients: RwLock::new(HashMap::new()),
            transient_getters: DashMap::new(),
            global_long_lived,
            networks: RwLock::new(Vec::new()),
            container_options,
            root: tokio_util::sync::CancellationToken::new(),
        }
    }

    pub fn set_networks(&self, list: Vec<String>) {
        *self.networks.write() = list;
    }

    fn is_long_lived(&self, server_config: &ServerConfig) -> bool {
        server_config.spec.long_lived || self.global_long_lived
    }

    fn retains(&self, server_config: &ServerConfig, client_config: &ClientConfig) -> bool {
        self.is_long_lived(server_config) && !client_config.session_ref.is_empty()
    }

    /// Acquire a client for `(serverConfig.spec.name, clientConfig.sessionRef)`.
    /// For long-lived servers with a non-empty session, the entry is
    /// retained in the pool and initialization runs detached from the
    /// caller's cancellation so the client survives the request that
    /// created it. For all others, the client is acquired fresh.
    pub async fn acquire_client(
        &self,
        server_config: ServerConfig,
        client_config: ClientConfig,
    ) -> GatewayResult<BackendClient> {
        let key = PoolKey { server_name: server_config.spec.name.clone(), session_ref: client_config.session_ref.clone() };
        let retain = self.retains(&server_config, &client_config);

        if retain {
            return self.acquire_retained(key, server_config, client_config).await;
        }
        self.acquire_transient(key, server_config, client_config).await
    }

    async fn acquire_retained(
        &self,
        key: PoolKey,
        server_config: ServerConfig,
        client_config: ClientConfig,
    ) -> GatewayResult<BackendClient> {
        let existing = self.kept_clients.read().get(&key).cloned();
        let entry = if let Some(entry) = existing {
            entry
        } else {
            let entry = Arc::new(PoolEntry {
                getter: Arc::new(ClientGetter::new()),
                server_config: server_config.clone(),
                client_config: client_config.clone(),
            });
            let mut w = self.kept_clients.write();
            w.entry(key.clone()).or_insert_with(|| entry.clone()).clone()
        };

        // Long-lived acquisition ignores the caller's context: it runs
        // under the pool's own root token so the client outlives this call.
        let root = self.root.clone();
        let options = self.container_options.clone();
        let networks = self.networks.read().clone();
        let result = entry
            .getter
            .get_or_init(move || async move {
                if root.is_cancelled() {
                    return Err(GatewayError::backend_connection("pool is closed"));
                }
                initialize(&entry.server_config, &entry.client_config, &options, &networks).await
            })
            .await;

        if result.is_err() {
            // Initialization failures delete the entry so the next acquire retries.
            self.kept_clients.write().remove(&key);
        }
        result
    }

    async fn acquire_transient(
        &self,
        key: PoolKey,
        server_config: ServerConfig,
        client_config: ClientConfig,
    ) -> GatewayResult<BackendClient> {
        let getter = self
            .transient_getters
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ClientGetter::new()))
            .clone();

        let options = self.container_options.clone();
        let networks = self.networks.read().clone();
        let result = getter
            .get_or_init(move || async move { initialize(&server_config, &client_config, &options, &networks).await })
            .await;

        // Whether it succeeded or failed, a transient getter is single-use:
        // drop it so the next caller for this key starts fresh.
        self.transient_getters.remove(&key);
        result
    }

    /// Release a client acquired via `acquire_client`. If it's not
    /// currently retained, close its session; otherwise leave it running.
    pub async fn release_client(&self, key: &PoolKey, client: BackendClient) {
        let retained = self.kept_clients.read().contains_key(key);
        if !retained {
            client.close().await;
        }
    }

    /// Swap out the retained map under write lock, then close every
    /// contained session outside the lock (never hold a lock across I/O).
    pub async fn close(&self) {
        self.root.cancel();
        let taken: HashMap<PoolKey, Arc<PoolEntry>> = std::mem::take(&mut *self.kept_clients.write());
        for entry in taken.into_values() {
            if let GetterState::Ready = entry.getter.state() {
                if let Ok(client) = entry.getter.get_or_init(|| async { Err(GatewayError::backend_connection("closed")) }).await {
                    client.close().await;
                }
            }
        }
    }

    /// Remove retained entries whose name matches and whose spec is
    /// `type=remote` (with or without explicit OAuth metadata); non-remote
    /// and other-named entries are untouched (spec §8 quantified invariant,
    /// §4.2 `InvalidateOAuthClients`).
    pub fn invalidate_oauth_clients(&self, server_name: &str) {
        let mut w = self.kept_clients.write();
        w.retain(|key, entry| {
            let is_target_remote = key.server_name == server_name && entry.server_config.spec.is_remote();
            !is_target_remote
        });
    }

    /// Forward an updated roots list to every retained entry bound to `session`.
    pub async fn update_roots(&self, session_ref: &str, roots: Vec<String>) {
        let entries: Vec<Arc<PoolEntry>> = self
            .kept_clients
            .read()
            .iter()
            .filter(|(k, _)| k.session_ref == session_ref)
            .map(|(_, v)| v.clone())
            .collect();
        for entry in entries {
            if let Ok(client) = entry.getter.get_or_init(|| async { Err(GatewayError::backend_connection("not ready")) }).await {
                let _ = client.update_roots(roots.clone()).await;
            }
        }
    }

    /// Evict every pool entry keyed by a closed session's reference
    /// (spec §3 "Session" lifecycle).
    pub async fn evict_session(&self, session_ref: &str) {
        let removed: Vec<Arc<PoolEntry>> = {
            let mut w = self.kept_clients.write();
            let keys: Vec<PoolKey> = w.keys().filter(|k| k.session_ref == session_ref).cloned().collect();
            keys.into_iter().filter_map(|k| w.remove(&k)).collect()
        };
        for entry in removed {
            if let Ok(client) = entry.getter.get_or_init(|| async { Err(GatewayError::backend_connection("evicted")) }).await {
                client.close().await;
            }
        }
    }
}

use crate::pool::client_getter::GetterState;

/// M2's three-way constructor dispatch (spec §4.2 "Initialization"):
/// legacy SSE endpoint, `remote.url`, static socat routing, or
/// stdio-over-container with an optional egress proxy.
async fn initialize(
    server_config: &ServerConfig,
    client_config: &ClientConfig,
    options: &ContainerOptions,
    networks: &[String],
) -> GatewayResult<BackendClient> {
    let spec = &server_config.spec;

    if let Some(endpoint) = &spec.sse_endpoint {
        return BackendClient::sse(endpoint.clone(), spec.remote.headers.clone()).await;
    }
    if let Some(url) = &spec.remote.url {
        return match spec.remote.transport {
            Some(crate::model::RemoteTransport::Sse) => BackendClient::sse(url.clone(), spec.remote.headers.clone()).await,
            _ => BackendClient::streamable_http(url.clone(), spec.remote.headers.clone()).await,
        };
    }
    if options.static_mode {
        return BackendClient::stdio(
            "socat".to_string(),
            vec!["-".to_string(), format!("TCP:mcp-{}:4444", spec.name)],
            Vec::new(),
        )
        .await;
    }

    let mut target = container::TargetConfig::default();
    if ProxyRunner::should_spawn(spec, options.block_network) {
        let proxy_network = format!("{}-egress", spec.name);
        let handle = ProxyRunner::spawn(spec, &proxy_network).await?;
        target = handle.target;
    }

    let built = container::build_args(server_config, client_config.read_only_hint, &target, options, networks);
    let env: Vec<(String, String)> = built
        .env
        .iter()
        .filter_map(|kv| kv.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect();
    BackendClient::stdio("docker".to_string(), built.args, env).await
}
