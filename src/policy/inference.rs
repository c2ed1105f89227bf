//! L3 — Policy inference: derive `{serverSourceType, serverSource,
//! transport}` from a server spec using the documented tie-break rules
//! (spec §4.4, round-trip laws in §8).

use crate::model::{RemoteTransport, ServerSpec, ServerType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inference {
    pub server_source_type: String,
    pub server_source: String,
    pub transport: String,
}

pub fn infer(spec: &ServerSpec) -> Inference {
    let server_source_type = infer_source_type(spec);
    let server_source = infer_source(spec, &server_source_type);
    let transport = infer_transport(spec);
    Inference { server_source_type, server_source, transport }
}

fn infer_source_type(spec: &ServerSpec) -> String {
    match spec.server_type {
        Some(ServerType::Server) | Some(ServerType::Poci) => "registry".to_string(),
        Some(ServerType::Remote) => "remote".to_string(),
        None => {
            if spec.sse_endpoint.is_some() || spec.remote.url.is_some() {
                "remote".to_string()
            } else if spec.image.is_some() {
                "image".to_string()
            } else {
                String::new()
            }
        }
    }
}

fn infer_source(spec: &ServerSpec, source_type: &str) -> String {
    match source_type {
        "registry" | "image" => spec.image.clone().unwrap_or_default(),
        "remote" => spec
            .sse_endpoint
            .clone()
            .or_else(|| spec.remote.url.clone())
            .unwrap_or_default(),
        _ => spec
            .image
            .clone()
            .or_else(|| spec.sse_endpoint.clone())
            .or_else(|| spec.remote.url.clone())
            .unwrap_or_default(),
    }
}

fn infer_transport(spec: &ServerSpec) -> String {
    if spec.sse_endpoint.is_some() {
        return "sse".to_string();
    }
    if let Some(t) = spec.remote.transport {
        return match t {
            RemoteTransport::Http | RemoteTransport::StreamableHttp => "streamable".to_string(),
            RemoteTransport::Sse => "sse".to_string(),
        };
    }
    if spec.remote.url.is_some() {
        return "streamable".to_string();
    }
    if spec.image.is_some() {
        return "stdio".to_string();
    }
    String::new()
}
