//! L4 — Policy request construction: single and batched, catalog- and
//! working-set-scoped variants (spec §3 "Policy Request", §4.4).

use serde::{Deserialize, Serialize};

use super::inference::{infer, Inference};
use crate::model::ServerSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Load,
    Invoke,
    Prompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Target {
    Tool { name: String },
    Server { name: String },
    Catalog { name: String },
    WorkingSet { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub catalog: Option<String>,
    pub working_set: Option<String>,
    pub server: String,
    pub server_type: String,
    pub server_source: String,
    pub transport: String,
    pub tool: Option<String>,
    pub action: Action,
    pub target: Option<Target>,
}

/// Build a single policy request for `server`, optionally scoped to a
/// specific tool, given the gateway's current catalog/working-set identifiers.
pub fn build(
    spec: &ServerSpec,
    action: Action,
    tool: Option<&str>,
    catalog: Option<&str>,
    working_set: Option<&str>,
) -> PolicyRequest {
    let Inference { server_source_type, server_source, transport } = infer(spec);
    let target = match tool {
        Some(t) => Some(Target::Tool { name: t.to_string() }),
        None => Some(Target::Server { name: spec.name.clone() }),
    };
    PolicyRequest {
        catalog: catalog.map(str::to_string),
        working_set: working_set.map(str::to_string),
        server: spec.name.clone(),
        server_type: server_source_type,
        server_source,
        transport,
        tool: tool.map(str::to_string),
        action,
        target,
    }
}

pub fn build_catalog_scoped(catalog: &str, action: Action) -> PolicyRequest {
    PolicyRequest {
        catalog: Some(catalog.to_string()),
        working_set: None,
        server: String::new(),
        server_type: String::new(),
        server_source: String::new(),
        transport: String::new(),
        tool: None,
        action,
        target: Some(Target::Catalog { name: catalog.to_string() }),
    }
}

pub fn build_working_set_scoped(working_set: &str, action: Action) -> PolicyRequest {
    PolicyRequest {
        catalog: None,
        working_set: Some(working_set.to_string()),
        server: String::new(),
        server_type: String::new(),
        server_source: String::new(),
        transport: String::new(),
        tool: None,
        action,
        target: Some(Target::WorkingSet { name: working_set.to_string() }),
    }
}

/// Build one request per item for a batch evaluation call.
pub fn build_batch<'a, I>(items: I) -> Vec<PolicyRequest>
where
    I: IntoIterator<Item = (&'a ServerSpec, Action, Option<&'a str>)>,
{
    items.into_iter().map(|(spec, action, tool)| build(spec, action, tool, None, None)).collect()
}
