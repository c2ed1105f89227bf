//! H6 — Profile activator: two-phase activation (pre-flight then apply) so
//! a profile never lands half-installed (spec §8 scenario 5 "all-or-nothing
//! activation"). Grounded on `turbomcp-server::middleware::validation`'s
//! `jsonschema::validator_for` + `iter_errors` pattern for config
//! validation.

use jsonschema::validator_for;
use std::sync::Arc;
use tracing::{info, warn};

use crate::capability::CapabilityTracker;
use crate::config::dao::ProfileRow;
use crate::config::reload::ConfigurationReloader;
use crate::config::resolver::{resolve, ResolveInput};
use crate::config::{CatalogReader, ImagePuller, OciSnapshotResolver, ProfileDao};
use crate::error::{GatewayError, GatewayResult};
use crate::model::ServerSpec;
use crate::secrets::SecretsEngineClient;

/// One pre-flight failure for a single server within the profile being
/// activated.
#[derive(Debug, Clone)]
pub struct PreflightFailure {
    pub server: String,
    pub reason: String,
}

/// Result of the pre-flight phase. Non-empty `failures` means activation
/// must abort before any mutation happens.
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub failures: Vec<PreflightFailure>,
}

impl PreflightReport {
    pub fn is_clear(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ProfileActivator {
    dao: Arc<dyn ProfileDao>,
    oci: Arc<dyn OciSnapshotResolver>,
    catalog: Arc<dyn CatalogReader>,
    secrets: Arc<SecretsEngineClient>,
    reloader: Arc<ConfigurationReloader>,
    capabilities: Arc<CapabilityTracker>,
    images: Arc<dyn ImagePuller>,
}

impl ProfileActivator {
    pub fn new(
        dao: Arc<dyn ProfileDao>,
        oci: Arc<dyn OciSnapshotResolver>,
        catalog: Arc<dyn CatalogReader>,
        secrets: Arc<SecretsEngineClient>,
        reloader: Arc<ConfigurationReloader>,
        capabilities: Arc<CapabilityTracker>,
        images: Arc<dyn ImagePuller>,
    ) -> Self {
        Self { dao, oci, catalog, secrets, reloader, capabilities, images }
    }

    /// Phase 1: verify every declared secret resolves and every user
    /// config item validates against its server's JSON schema. Does not
    /// mutate any gateway state.
    pub async fn preflight(&self, row: &ProfileRow) -> GatewayResult<PreflightReport> {
        let mut failures = Vec::new();
        let available_secrets = self.secrets.get_secrets().await.unwrap_or_default();

        for name in &row.server_names {
            let Some(spec) = row.servers.get(name) else { continue };

            for decl in &spec.secrets {
                if !available_secrets.iter().any(|e| e.id == decl.name) {
                    failures.push(PreflightFailure {
                        server: name.clone(),
                        reason: format!("secret '{}' not present", decl.name),
                    });
                }
            }

            if let Some(config_values) = row.config.get(name) {
                if let Err(reason) = validate_config(spec, config_values) {
                    failures.push(PreflightFailure { server: name.clone(), reason });
                }
            }

            if let Some(image) = &spec.image {
                if let Err(e) = self.images.pull(image).await {
                    failures.push(PreflightFailure { server: name.clone(), reason: format!("image pull failed: {e}") });
                }
            }
        }

        Ok(PreflightReport { failures })
    }

    /// Phase 2: merge the profile into the active working set, reload
    /// configuration, and refresh capability sets. Only reached once
    /// `preflight` reports no failures.
    pub async fn activate(&self, working_set: &str, row: ProfileRow) -> GatewayResult<()> {
        let report = self.preflight(&row).await?;
        if !report.is_clear() {
            let reasons = report.failures.iter().map(|f| format!("{}: {}", f.server, f.reason)).collect::<Vec<_>>().join("; ");
            return Err(GatewayError::profile_activation(format!("pre-flight failed, nothing installed: {reasons}")));
        }

        self.dao.upsert(working_set, row).await?;

        let configuration = resolve(ResolveInput {
            working_set,
            dynamic_discovery: false,
            dao: self.dao.clone(),
            oci: self.oci.clone(),
            catalog: self.catalog.clone(),
        })
        .await?;

        let diff = self.reloader.install(configuration);
        for removed in &diff.removed_servers {
            self.capabilities.remove(removed);
        }
        info!(working_set, added = diff.added_servers.len(), "profile activated");
        Ok(())
    }
}

fn validate_config(spec: &ServerSpec, values: &serde_json::Map<String, serde_json::Value>) -> Result<(), String> {
    for item in &spec.config {
        let Some(value) = values.get(&item.name) else { continue };
        let validator = validator_for(&item.schema).map_err(|e| format!("schema for '{}' does not compile: {e}", item.name))?;
        let errors: Vec<String> = validator.iter_errors(value).map(|e| format!("{}: {e}", e.instance_path)).collect();
        if !errors.is_empty() {
            warn!(item = item.name, errors = errors.join("; "), "config item failed schema validation");
            return Err(format!("config item '{}' invalid: {}", item.name, errors.join("; ")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dao::{InMemoryCatalog, InMemoryProfileDao, NullImagePuller, PassthroughOciResolver};
    use crate::model::{ConfigItem, SecretDecl, ServerType};
    use std::collections::HashMap;

    fn activator() -> ProfileActivator {
        ProfileActivator::new(
            Arc::new(InMemoryProfileDao::new()),
            Arc::new(PassthroughOciResolver),
            Arc::new(InMemoryCatalog::new(vec![])),
            SecretsEngineClient::new().unwrap(),
            Arc::new(ConfigurationReloader::new(Default::default())),
            Arc::new(CapabilityTracker::new()),
            Arc::new(NullImagePuller),
        )
    }

    fn spec_with_config_item() -> ServerSpec {
        ServerSpec {
            name: "grafana".into(),
            server_type: Some(ServerType::Server),
            image: Some("grafana/mcp".into()),
            remote: Default::default(),
            sse_endpoint: None,
            oauth: Default::default(),
            secrets: vec![SecretDecl { name: "api_key".into(), env: "GRAFANA_API_KEY".into() }],
            env: vec![],
            command: vec![],
            volumes: vec![],
            user: None,
            disable_network: false,
            allow_hosts: vec![],
            extra_hosts: vec![],
            long_lived: false,
            tools: vec![],
            config: vec![ConfigItem {
                name: "timeout".into(),
                schema: serde_json::json!({ "type": "integer", "minimum": 1 }),
            }],
            secrets_provider: None,
        }
    }

    #[tokio::test]
    async fn preflight_reports_missing_secret() {
        let activator = activator();
        let mut row = ProfileRow { server_names: vec!["grafana".into()], ..Default::default() };
        row.servers.insert("grafana".into(), spec_with_config_item());
        let report = activator.preflight(&row).await.unwrap();
        assert!(!report.is_clear());
        assert_eq!(report.failures[0].server, "grafana");
    }

    #[tokio::test]
    async fn preflight_reports_invalid_config_value() {
        let activator = activator();
        let mut row = ProfileRow { server_names: vec!["grafana".into()], ..Default::default() };
        row.servers.insert("grafana".into(), spec_with_config_item());
        let mut config = HashMap::new();
        let mut values = serde_json::Map::new();
        values.insert("timeout".into(), serde_json::json!(-5));
        config.insert("grafana".to_string(), values);
        row.config = config;
        let report = activator.preflight(&row).await.unwrap();
        // Both the missing-secret and invalid-config failures are reported.
        assert!(report.failures.iter().any(|f| f.reason.contains("timeout")));
    }

    #[tokio::test]
    async fn activation_aborts_entirely_on_preflight_failure() {
        let activator = activator();
        let mut row = ProfileRow { server_names: vec!["grafana".into()], ..Default::default() };
        row.servers.insert("grafana".into(), spec_with_config_item());
        let result = activator.activate("default", row).await;
        assert!(result.is_err());
        // Nothing was installed: the reloader's current configuration is still empty.
        assert!(activator.reloader.current().server_names.is_empty());
    }
}
