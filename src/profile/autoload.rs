//! H8 — Profile auto-load: on a recognized client handshake, read a
//! workspace-local profile manifest and activate every profile it lists
//! (spec §4.1 "auto-load on handshake"). Grounded on
//! `turbomcp-server`'s client-info-keyed handshake hooks.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::dao::ProfileRow;
use crate::error::GatewayResult;
use crate::profile::activator::ProfileActivator;

/// Manifest file name looked for at the workspace root.
pub const MANIFEST_FILE: &str = ".mcp-gateway-profiles.json";

#[derive(Debug, Deserialize)]
struct Manifest {
    /// Client names this manifest applies to; empty means "any client".
    #[serde(default)]
    clients: Vec<String>,
    profiles: Vec<String>,
}

/// Loads and applies a workspace's profile manifest for a recognized
/// client, delegating each named profile to the activator. A profile
/// referenced in the manifest but missing from the DAO is skipped with a
/// warning rather than aborting the others — auto-load is best-effort by
/// design (spec §9).
pub struct ProfileAutoLoader {
    activator: Arc<ProfileActivator>,
}

impl ProfileAutoLoader {
    pub fn new(activator: Arc<ProfileActivator>) -> Self {
        Self { activator }
    }

    pub async fn on_handshake(&self, workspace_root: &Path, client_name: &str) -> GatewayResult<Vec<String>> {
        let manifest_path = workspace_root.join(MANIFEST_FILE);
        let raw = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = serde_json::from_str(&raw)?;
        if !manifest.clients.is_empty() && !manifest.clients.iter().any(|c| c == client_name) {
            return Ok(Vec::new());
        }

        let mut activated = Vec::new();
        for profile in &manifest.profiles {
            match self.load_row(workspace_root, profile).await {
                Ok(Some(row)) => match self.activator.activate(profile, row).await {
                    Ok(()) => {
                        info!(profile, client_name, "auto-loaded profile");
                        activated.push(profile.clone());
                    }
                    Err(e) => warn!(profile, error = %e, "auto-load activation failed, skipping"),
                },
                Ok(None) => warn!(profile, "auto-load manifest referenced an undefined profile, skipping"),
                Err(e) => warn!(profile, error = %e, "could not read profile definition, skipping"),
            }
        }
        Ok(activated)
    }

    async fn load_row(&self, workspace_root: &Path, profile: &str) -> GatewayResult<Option<ProfileRow>> {
        let path = workspace_root.join(format!(".mcp-gateway-profile-{profile}.json"));
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let row: ProfileRowDocument = serde_json::from_str(&raw)?;
                Ok(Some(row.into()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// On-disk shape of a single profile's server list, decoupled from
/// `ProfileRow`'s in-memory representation.
#[derive(Debug, Deserialize)]
struct ProfileRowDocument {
    #[serde(default)]
    server_names: Vec<String>,
    #[serde(default)]
    servers: std::collections::HashMap<String, crate::model::ServerSpec>,
}

impl From<ProfileRowDocument> for ProfileRow {
    fn from(doc: ProfileRowDocument) -> Self {
        ProfileRow { server_names: doc.server_names, servers: doc.servers, config: Default::default(), tool_filters: Default::default() }
    }
}
