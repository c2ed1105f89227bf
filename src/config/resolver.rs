//! H2 — Configuration resolver: loads a working-set snapshot and produces
//! `{serverNames, servers, config, tools, secrets}` (spec §4.1).

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::config::dao::{CatalogReader, OciSnapshotResolver, ProfileDao};
use crate::error::{GatewayError, GatewayResult};
use crate::model::{Configuration, ServerType, ToolFilters};
use crate::secrets::build_secrets_uris;

/// The reserved identifier for "no profile selected": resolving it never
/// fails, it just yields an empty (or catalog-unioned) configuration.
pub const DEFAULT_WORKING_SET: &str = "default";

pub struct ResolveInput<'a> {
    pub working_set: &'a str,
    pub dynamic_discovery: bool,
    pub dao: Arc<dyn ProfileDao>,
    pub oci: Arc<dyn OciSnapshotResolver>,
    pub catalog: Arc<dyn CatalogReader>,
}

/// Resolve a `Configuration` for `input.working_set`. Servers whose type is
/// neither `image` nor `remote` are skipped (spec §4.1 "Skip servers whose
/// type is not image or remote").
pub async fn resolve(input: ResolveInput<'_>) -> GatewayResult<Configuration> {
    let row = input.dao.find(input.working_set).await?;

    let row = match row {
        Some(row) => row,
        None if input.working_set == DEFAULT_WORKING_SET => Default::default(),
        None => {
            return Err(GatewayError::configuration(format!(
                "working set '{}' not found",
                input.working_set
            )))
        }
    };

    // Duplicate server names within a profile is an error (spec §4.1 edge case).
    let mut seen = std::collections::HashSet::new();
    for name in &row.server_names {
        if !seen.insert(name) {
            return Err(GatewayError::configuration(format!("duplicate server name '{name}' in profile")));
        }
    }

    let mut servers = HashMap::new();
    let mut config = HashMap::new();
    let mut secrets = HashMap::new();
    let mut tool_filters = ToolFilters::default();

    for name in &row.server_names {
        let Some(raw_spec) = row.servers.get(name).cloned() else { continue };
        if !matches!(raw_spec.server_type, Some(ServerType::Server) | Some(ServerType::Poci) | Some(ServerType::Remote))
            && raw_spec.image.is_none()
            && raw_spec.remote.url.is_none()
        {
            continue;
        }
        let spec = input.oci.resolve(&raw_spec).await?;

        for (key, uri) in build_secrets_uris(&spec) {
            secrets.insert(key, uri);
        }
        if let Some(cfg) = row.config.get(name) {
            config.insert(name.clone(), cfg.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        }
        if let Some(allowed) = row.tool_filters.get(name) {
            if tool_filters.server_tools.insert(name.clone(), allowed.clone()).is_some() {
                warn!(server = %name, "overlapping tool allow-list for server overwritten");
            }
        }
        servers.insert(name.clone(), spec);
    }

    let mut server_names: Vec<String> = servers.keys().cloned().collect();

    if input.dynamic_discovery {
        for catalog_spec in input.catalog.all_servers().await? {
            // Profile entries win on name collision against the catalog union.
            if servers.contains_key(&catalog_spec.name) {
                continue;
            }
            for (key, uri) in build_secrets_uris(&catalog_spec) {
                secrets.entry(key).or_insert(uri);
            }
            server_names.push(catalog_spec.name.clone());
            servers.insert(catalog_spec.name.clone(), catalog_spec);
        }
    }

    server_names.sort();
    Ok(Configuration { server_names, servers, config, tools: tool_filters, secrets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dao::{InMemoryCatalog, InMemoryProfileDao, PassthroughOciResolver, ProfileRow};
    use crate::model::{RemoteConfig, SecretDecl, ServerSpec};

    fn spec(name: &str) -> ServerSpec {
        ServerSpec {
            name: name.into(),
            server_type: Some(ServerType::Server),
            image: Some(format!("{name}/image")),
            remote: RemoteConfig::default(),
            sse_endpoint: None,
            oauth: Default::default(),
            secrets: vec![SecretDecl { name: "key".into(), env: "KEY".into() }],
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

    #[tokio::test]
    async fn missing_default_profile_yields_empty_configuration() {
        let dao = Arc::new(InMemoryProfileDao::new());
        let input = ResolveInput {
            working_set: DEFAULT_WORKING_SET,
            dynamic_discovery: false,
            dao,
            oci: Arc::new(PassthroughOciResolver),
            catalog: Arc::new(InMemoryCatalog::new(vec![])),
        };
        let config = resolve(input).await.unwrap();
        assert!(config.server_names.is_empty());
    }

    #[tokio::test]
    async fn missing_named_profile_errors() {
        let dao = Arc::new(InMemoryProfileDao::new());
        let input = ResolveInput {
            working_set: "nope",
            dynamic_discovery: false,
            dao,
            oci: Arc::new(PassthroughOciResolver),
            catalog: Arc::new(InMemoryCatalog::new(vec![])),
        };
        assert!(resolve(input).await.is_err());
    }

    #[tokio::test]
    async fn builds_secrets_and_config_for_profile_servers() {
        let dao = Arc::new(InMemoryProfileDao::new());
        let mut row = ProfileRow { server_names: vec!["grafana".into()], ..Default::default() };
        row.servers.insert("grafana".into(), spec("grafana"));
        dao.seed("default", row);

        let input = ResolveInput {
            working_set: DEFAULT_WORKING_SET,
            dynamic_discovery: false,
            dao,
            oci: Arc::new(PassthroughOciResolver),
            catalog: Arc::new(InMemoryCatalog::new(vec![])),
        };
        let config = resolve(input).await.unwrap();
        assert_eq!(config.server_names, vec!["grafana".to_string()]);
        assert_eq!(config.secrets.get("key").unwrap(), "se://docker/mcp/key");
    }

    #[tokio::test]
    async fn profile_wins_over_dynamic_discovery_on_name_collision() {
        let dao = Arc::new(InMemoryProfileDao::new());
        let mut profile_spec = spec("shared");
        profile_spec.image = Some("profile/image".into());
        let mut row = ProfileRow { server_names: vec!["shared".into()], ..Default::default() };
        row.servers.insert("shared".into(), profile_spec);
        dao.seed("default", row);

        let mut catalog_spec = spec("shared");
        catalog_spec.image = Some("catalog/image".into());
        let catalog = Arc::new(InMemoryCatalog::new(vec![catalog_spec]));

        let input = ResolveInput {
            working_set: DEFAULT_WORKING_SET,
            dynamic_discovery: true,
            dao,
            oci: Arc::new(PassthroughOciResolver),
            catalog,
        };
        let config = resolve(input).await.unwrap();
        assert_eq!(config.servers.get("shared").unwrap().image.as_deref(), Some("profile/image"));
    }

    #[tokio::test]
    async fn duplicate_server_names_in_profile_error() {
        let dao = Arc::new(InMemoryProfileDao::new());
        let row = ProfileRow { server_names: vec!["a".into(), "a".into()], ..Default::default() };
        dao.seed("default", row);
        let input = ResolveInput {
            working_set: DEFAULT_WORKING_SET,
            dynamic_discovery: false,
            dao,
            oci: Arc::new(PassthroughOciResolver),
            catalog: Arc::new(InMemoryCatalog::new(vec![])),
        };
        assert!(resolve(input).await.is_err());
    }
}
