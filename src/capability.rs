//! H5 — Capability tracker: per-server set of advertised tools, prompts,
//! resources, templates; diff-based updates; thread-safe under session
//! concurrency (spec §3 "Capability Set", §9 "capability refresh must be
//! idempotent under re-entry").

use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::backend::BackendClient;
use crate::error::{GatewayError, GatewayResult};
use crate::model::{CapabilitySet, ToolRegistration};

/// Diff between two capability snapshots for one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityDiff {
    pub added_tools: Vec<String>,
    pub removed_tools: Vec<String>,
    pub added_prompts: Vec<String>,
    pub removed_prompts: Vec<String>,
    pub added_resources: Vec<String>,
    pub removed_resources: Vec<String>,
}

impl CapabilityDiff {
    pub fn is_empty(&self) -> bool {
        self.added_tools.is_empty()
            && self.removed_tools.is_empty()
            && self.added_prompts.is_empty()
            && self.removed_prompts.is_empty()
            && self.added_resources.is_empty()
            && self.removed_resources.is_empty()
    }
}

fn diff_sets(old: &BTreeSet<String>, new: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
    let added = new.difference(old).cloned().collect();
    let removed = old.difference(new).cloned().collect();
    (added, removed)
}

/// Tracks capability sets for every active server. Writes are
/// diff-computed and only taken under the per-server write lock during
/// application — never during the (possibly concurrent) computation of
/// what changed, so a refresh triggered by re-entrant backend
/// notifications stays idempotent.
pub struct CapabilityTracker {
    sets: DashMap<String, Arc<CapabilitySet>>,
    /// Tool Registration entity (spec §3): every advertised tool keyed by
    /// its globally unique registered name, kept alongside the capability
    /// sets it's derived from.
    registry: DashMap<String, ToolRegistration>,
}

impl CapabilityTracker {
    pub fn new() -> Self {
        Self { sets: DashMap::new(), registry: DashMap::new() }
    }

    /// Look up the owning server for a registered tool name. Used by
    /// `mcp-exec` to resolve its target tool's `(serverName, Invoke)` pair
    /// without trusting a server name supplied by the caller.
    pub fn resolve(&self, registered_name: &str) -> Option<ToolRegistration> {
        self.registry.get(registered_name).map(|e| e.clone())
    }

    /// The tool's `readOnlyHint` annotation, if its backend advertised one
    /// (spec §4.5 step 4). `None` for an unknown tool or one with no hint.
    pub fn read_only_hint(&self, registered_name: &str) -> Option<bool> {
        self.registry.get(registered_name).and_then(|e| e.read_only_hint)
    }

    /// Register a `code-mode` aggregate tool under `registered_name`,
    /// giving it script-time access to every server in `union_servers`.
    /// Fails deterministically if the name is already taken (spec §9 "Tool
    /// registry naming": guarantee uniqueness, deterministic collision error).
    pub fn register_aggregate(
        &self,
        registered_name: String,
        tool: String,
        union_servers: Vec<String>,
    ) -> GatewayResult<()> {
        if self.registry.contains_key(&registered_name) {
            return Err(GatewayError::configuration(format!("tool '{registered_name}' is already registered")));
        }
        self.registry.insert(
            registered_name.clone(),
            ToolRegistration {
                server_name: "dynamic-mcps".to_string(),
                tool,
                registered_name,
                union_servers,
                read_only_hint: None,
            },
        );
        Ok(())
    }

    pub fn get(&self, server: &str) -> Option<Arc<CapabilitySet>> {
        self.sets.get(server).map(|e| e.clone())
    }

    /// Union of every server's exposed tools, for the aggregated
    /// capability surface the gateway presents to clients.
    pub fn union_tools(&self) -> BTreeSet<String> {
        self.sets.iter().flat_map(|e| e.tools.clone()).collect()
    }

    /// Refresh one server's capability set from a live client, applying the
    /// diff and returning it. Idempotent: calling this twice with
    /// unchanged backend state yields an empty diff both times.
    pub async fn refresh(&self, server: &str, client: &BackendClient) -> GatewayResult<CapabilityDiff> {
        let backend_tools = client.list_tools().await?;
        let tool_read_only_hints: BTreeMap<String, bool> = backend_tools
            .iter()
            .filter_map(|t| t.annotations.as_ref()?.read_only_hint.map(|hint| (t.name.clone(), hint)))
            .collect();
        let tools: BTreeSet<String> = backend_tools.into_iter().map(|t| t.name).collect();
        let prompts: BTreeSet<String> = client.list_prompts().await?.into_iter().map(|p| p.name).collect();
        let resources: BTreeSet<String> = client.list_resources().await?.into_iter().map(|r| r.uri).collect();

        let new_set = CapabilitySet { tools, prompts, resources, templates: BTreeSet::new(), tool_read_only_hints };
        self.apply(server, new_set)
    }

    /// Apply a freshly-computed capability set, diffing against whatever
    /// was previously recorded. This is the only place that writes `sets`.
    pub fn apply(&self, server: &str, new_set: CapabilitySet) -> GatewayResult<CapabilityDiff> {
        let previous = self.sets.get(server).map(|e| (**e).clone()).unwrap_or_default();
        let (added_tools, removed_tools) = diff_sets(&previous.tools, &new_set.tools);
        let (added_prompts, removed_prompts) = diff_sets(&previous.prompts, &new_set.prompts);
        let (added_resources, removed_resources) = diff_sets(&previous.resources, &new_set.resources);

        for tool in &new_set.tools {
            let hint = new_set.tool_read_only_hints.get(tool).copied();
            self.registry
                .entry(tool.clone())
                .and_modify(|entry| entry.read_only_hint = hint)
                .or_insert_with(|| ToolRegistration {
                    server_name: server.to_string(),
                    tool: tool.clone(),
                    registered_name: tool.clone(),
                    union_servers: Vec::new(),
                    read_only_hint: hint,
                });
        }

        self.sets.insert(server.to_string(), Arc::new(new_set));

        for tool in &removed_tools {
            if let Some(entry) = self.registry.get(tool) {
                if entry.server_name != server {
                    continue;
                }
            }
            self.registry.remove(tool);
        }

        Ok(CapabilityDiff {
            added_tools,
            removed_tools,
            added_prompts,
            removed_prompts,
            added_resources,
            removed_resources,
        })
    }

    pub fn remove(&self, server: &str) {
        self.sets.remove(server);
        self.registry.retain(|_, entry| entry.server_name != server);
    }
}

impl Default for CapabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_applies_diff_exactly_once() {
        let tracker = CapabilityTracker::new();
        let mut set = CapabilitySet::default();
        set.tools.insert("a".into());
        let diff = tracker.apply("s", set.clone()).unwrap();
        assert_eq!(diff.added_tools, vec!["a".to_string()]);
        assert!(diff.removed_tools.is_empty());

        // Re-applying the identical set yields an empty diff (idempotent).
        let diff2 = tracker.apply("s", set).unwrap();
        assert!(diff2.is_empty());
    }

    #[test]
    fn diff_detects_removed_tools() {
        let tracker = CapabilityTracker::new();
        let mut first = CapabilitySet::default();
        first.tools.insert("a".into());
        first.tools.insert("b".into());
        tracker.apply("s", first).unwrap();

        let mut second = CapabilitySet::default();
        second.tools.insert("a".into());
        let diff = tracker.apply("s", second).unwrap();
        assert_eq!(diff.removed_tools, vec!["b".to_string()]);
        assert!(diff.added_tools.is_empty());
    }

    #[test]
    fn union_tools_spans_all_servers() {
        let tracker = CapabilityTracker::new();
        let mut a = CapabilitySet::default();
        a.tools.insert("x".into());
        let mut b = CapabilitySet::default();
        b.tools.insert("y".into());
        tracker.apply("s1", a).unwrap();
        tracker.apply("s2", b).unwrap();
        let union = tracker.union_tools();
        assert!(union.contains("x") && union.contains("y"));
    }

    #[test]
    fn apply_registers_added_tools_under_their_owning_server() {
        let tracker = CapabilityTracker::new();
        let mut set = CapabilitySet::default();
        set.tools.insert("deploy".into());
        tracker.apply("ci", set).unwrap();

        let registration = tracker.resolve("deploy").unwrap();
        assert_eq!(registration.server_name, "ci");
        assert_eq!(registration.registered_name, "deploy");
    }

    #[test]
    fn remove_drops_registry_entries_owned_by_that_server() {
        let tracker = CapabilityTracker::new();
        let mut set = CapabilitySet::default();
        set.tools.insert("deploy".into());
        tracker.apply("ci", set).unwrap();
        tracker.remove("ci");
        assert!(tracker.resolve("deploy").is_none());
    }

    #[test]
    fn apply_records_and_refreshes_the_read_only_hint() {
        let tracker = CapabilityTracker::new();
        let mut set = CapabilitySet::default();
        set.tools.insert("read_file".into());
        set.tool_read_only_hints.insert("read_file".into(), true);
        tracker.apply("fs", set).unwrap();
        assert_eq!(tracker.read_only_hint("read_file"), Some(true));

        // A later refresh without the annotation clears the hint rather
        // than leaving the stale value behind.
        let mut second = CapabilitySet::default();
        second.tools.insert("read_file".into());
        tracker.apply("fs", second).unwrap();
        assert_eq!(tracker.read_only_hint("read_file"), None);
    }

    #[test]
    fn register_aggregate_rejects_a_colliding_name() {
        let tracker = CapabilityTracker::new();
        tracker.register_aggregate("code-mode-demo".into(), "demo".into(), vec!["a".into(), "b".into()]).unwrap();
        let err = tracker.register_aggregate("code-mode-demo".into(), "demo2".into(), vec!["a".into()]).unwrap_err();
        assert!(err.sanitize().contains("already registered"));

        let registration = tracker.resolve("code-mode-demo").unwrap();
        assert_eq!(registration.server_name, "dynamic-mcps");
        assert_eq!(registration.union_servers, vec!["a".to_string(), "b".to_string()]);
    }
}
