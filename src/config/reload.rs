//! H3 — Configuration reload: atomic install of a freshly resolved
//! `Configuration`, diffed against the predecessor and broadcast to
//! subscribers (spec §3 Invariant 1 "single owner of mutation", §9
//! "capability refresh must be idempotent under re-entry").

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::model::Configuration;

/// What changed between two installed configurations, at the server-name
/// granularity the rest of the gateway reacts to (pool eviction, capability
/// refresh).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationDiff {
    pub added_servers: Vec<String>,
    pub removed_servers: Vec<String>,
    pub changed_servers: Vec<String>,
}

impl ConfigurationDiff {
    pub fn is_empty(&self) -> bool {
        self.added_servers.is_empty() && self.removed_servers.is_empty() && self.changed_servers.is_empty()
    }
}

fn diff(old: &Configuration, new: &Configuration) -> ConfigurationDiff {
    let old_names: std::collections::HashSet<_> = old.server_names.iter().collect();
    let new_names: std::collections::HashSet<_> = new.server_names.iter().collect();

    let added_servers: Vec<String> = new_names.difference(&old_names).map(|s| s.to_string()).collect();
    let removed_servers: Vec<String> = old_names.difference(&new_names).map(|s| s.to_string()).collect();

    let mut changed_servers = Vec::new();
    for name in old_names.intersection(&new_names) {
        let old_spec = old.servers.get(*name);
        let new_spec = new.servers.get(*name);
        let old_config = old.config.get(*name);
        let new_config = new.config.get(*name);
        if serde_json::to_value(old_spec).ok() != serde_json::to_value(new_spec).ok() || old_config != new_config {
            changed_servers.push((*name).clone());
        }
    }

    ConfigurationDiff { added_servers, removed_servers, changed_servers }
}

/// Holds the single, atomically-swappable live `Configuration` and
/// broadcasts diffs to subscribers (pool, capability tracker, handler
/// layer). Readers take a cheap `Arc` snapshot via `current()` and never
/// block a concurrent `install()`.
pub struct ConfigurationReloader {
    current: ArcSwap<Configuration>,
    changes: broadcast::Sender<ConfigurationDiff>,
}

impl ConfigurationReloader {
    pub fn new(initial: Configuration) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self { current: ArcSwap::from_pointee(initial), changes }
    }

    pub fn current(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigurationDiff> {
        self.changes.subscribe()
    }

    /// Install a newly resolved configuration, computing and broadcasting
    /// the diff against whatever was previously live. This is the single
    /// mutation point spec §3 Invariant 1 requires.
    pub fn install(&self, new: Configuration) -> ConfigurationDiff {
        let previous = self.current.load_full();
        let computed = diff(&previous, &new);
        self.current.store(Arc::new(new));
        if !computed.is_empty() {
            info!(
                added = computed.added_servers.len(),
                removed = computed.removed_servers.len(),
                changed = computed.changed_servers.len(),
                "configuration reloaded"
            );
        }
        // No subscribers is not an error; diff is still returned to the caller.
        let _ = self.changes.send(computed.clone());
        computed
    }
}
