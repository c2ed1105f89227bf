//! Trait boundaries to external collaborators spec.md §1 explicitly places
//! out of this core's scope: the profile database, the OCI snapshot
//! resolver, and the legacy catalog reader. Grounded on
//! `turbomcp-auth`'s pattern of defining a narrow async trait per external
//! dependency rather than hard-wiring a concrete storage backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::GatewayResult;
use crate::model::ServerSpec;

/// One row of the profile database, keyed by working-set identifier.
#[derive(Debug, Clone, Default)]
pub struct ProfileRow {
    pub server_names: Vec<String>,
    pub servers: HashMap<String, ServerSpec>,
    pub config: HashMap<String, serde_json::Map<String, serde_json::Value>>,
    pub tool_filters: HashMap<String, Vec<String>>,
}

#[async_trait]
pub trait ProfileDao: Send + Sync {
    async fn find(&self, working_set: &str) -> GatewayResult<Option<ProfileRow>>;
    async fn upsert(&self, working_set: &str, row: ProfileRow) -> GatewayResult<()>;
}

#[async_trait]
pub trait OciSnapshotResolver: Send + Sync {
    /// Resolve the currently pinned snapshot for a server reference,
    /// returning an updated spec (e.g. with the resolved image digest).
    async fn resolve(&self, spec: &ServerSpec) -> GatewayResult<ServerSpec>;
}

#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Every server spec in the locally cached catalog, used to union in
    /// dynamic-discovery mode (spec §4.1).
    async fn all_servers(&self) -> GatewayResult<Vec<ServerSpec>>;
}

#[async_trait]
pub trait ImagePuller: Send + Sync {
    /// Attempt to pull `image` ahead of activation so a missing or
    /// unreachable registry image surfaces as a pre-flight failure instead
    /// of a failed container start later (spec §4.6 step 1).
    async fn pull(&self, image: &str) -> GatewayResult<()>;
}

/// In-memory test double for `ProfileDao`, used by this crate's own tests
/// and suitable as a starting point for an embedded deployment.
#[derive(Default)]
pub struct InMemoryProfileDao {
    rows: RwLock<HashMap<String, ProfileRow>>,
}

impl InMemoryProfileDao {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, working_set: &str, row: ProfileRow) {
        self.rows.write().unwrap().insert(working_set.to_string(), row);
    }
}

#[async_trait]
impl ProfileDao for InMemoryProfileDao {
    async fn find(&self, working_set: &str) -> GatewayResult<Option<ProfileRow>> {
        Ok(self.rows.read().unwrap().get(working_set).cloned())
    }

    async fn upsert(&self, working_set: &str, row: ProfileRow) -> GatewayResult<()> {
        self.rows.write().unwrap().insert(working_set.to_string(), row);
        Ok(())
    }
}

/// Resolver that returns specs unchanged; used where no OCI pinning is configured.
pub struct PassthroughOciResolver;

#[async_trait]
impl OciSnapshotResolver for PassthroughOciResolver {
    async fn resolve(&self, spec: &ServerSpec) -> GatewayResult<ServerSpec> {
        Ok(spec.clone())
    }
}

/// Puller that always succeeds; used where no container runtime is wired in
/// (e.g. this crate's own tests).
pub struct NullImagePuller;

#[async_trait]
impl ImagePuller for NullImagePuller {
    async fn pull(&self, _image: &str) -> GatewayResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    servers: RwLock<Vec<ServerSpec>>,
}

impl InMemoryCatalog {
    pub fn new(servers: Vec<ServerSpec>) -> Self {
        Self { servers: RwLock::new(servers) }
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn all_servers(&self) -> GatewayResult<Vec<ServerSpec>> {
        Ok(self.servers.read().unwrap().clone())
    }
}
