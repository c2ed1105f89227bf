//! Fixed-order argv + env assembly for one container invocation. The
//! ordering here is load-bearing: it's asserted byte-for-byte by tests and
//! matches spec §4.3 and §8 scenario 1.

use crate::expr::evaluate;
use crate::model::ServerConfig;
use crate::secrets::UNKNOWN_SECRET;
use tracing::warn;

/// Global options shared by every container launch, independent of any
/// single server (spec §4.3 `Options`).
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub cpus: f64,
    pub memory: String,
    pub verbose: bool,
    pub static_mode: bool,
    pub block_network: bool,
    pub long_lived: bool,
    pub disable_network: bool,
}

/// Egress-proxy target descriptor, present only when the server declares
/// `allowHosts` and network-block is active (M3 Proxy Runner's output).
#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
    pub proxy_network: Option<String>,
    pub links: Vec<String>,
    pub env: Vec<String>,
    pub dns: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerArgs {
    pub args: Vec<String>,
    pub env: Vec<String>,
}

/// Whether the ambient environment is running inside Docker-in-Docker:
/// child containers should then run `--privileged`.
fn in_dind() -> bool {
    std::env::var("DOCKER_MCP_IN_DIND").as_deref() == Ok("1")
}

pub fn build_args(
    server_config: &ServerConfig,
    read_only_hint: Option<bool>,
    target: &TargetConfig,
    options: &Options,
    networks: &[String],
) -> ContainerArgs {
    let spec = &server_config.spec;
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-i".to_string(),
        "--init".to_string(),
        "--security-opt".to_string(),
        "no-new-privileges".to_string(),
        "--pull".to_string(),
        "never".to_string(),
        "-l".to_string(),
        "docker-mcp=true".to_string(),
        "-l".to_string(),
        "docker-mcp-tool-type=mcp".to_string(),
        "-l".to_string(),
        format!("docker-mcp-name={}", spec.name),
        "-l".to_string(),
        "docker-mcp-transport=stdio".to_string(),
    ];
    let mut env: Vec<String> = Vec::new();

    if options.cpus > 0.0 {
        args.push("--cpus".to_string());
        args.push(options.cpus.to_string());
    }
    if !options.memory.is_empty() {
        args.push("--memory".to_string());
        args.push(options.memory.clone());
    }
    if in_dind() {
        args.push("--privileged".to_string());
    }

    append_network(&mut args, spec.disable_network, options.disable_network, networks, target);
    append_secrets(&mut args, &mut env, server_config);
    append_env(&mut args, &mut env, server_config);
    append_volumes(&mut args, server_config, read_only_hint, options.long_lived);
    append_user(&mut args, server_config);
    append_extra_hosts(&mut args, &spec.extra_hosts);

    ContainerArgs { args, env }
}

fn append_network(
    args: &mut Vec<String>,
    spec_disable_network: bool,
    global_disable_network: bool,
    networks: &[String],
    target: &TargetConfig,
) {
    if spec_disable_network || global_disable_network {
        args.push("--network".to_string());
        args.push("none".to_string());
        return;
    }
    for n in networks {
        args.push("--network".to_string());
        args.push(n.clone());
    }
    if let Some(proxy_network) = &target.proxy_network {
        args.push("--network".to_string());
        args.push(proxy_network.clone());
        for link in &target.links {
            args.push("--link".to_string());
            args.push(link.clone());
        }
        for e in &target.env {
            args.push("-e".to_string());
            args.push(e.clone());
        }
        if let Some(dns) = &target.dns {
            args.push("--dns".to_string());
            args.push(dns.clone());
        }
    }
}

fn append_secrets(args: &mut Vec<String>, env: &mut Vec<String>, server_config: &ServerConfig) {
    for decl in &server_config.spec.secrets {
        args.push("-e".to_string());
        args.push(decl.env.clone());
        let value = server_config.secrets.get(&decl.name).cloned().unwrap_or_else(|| {
            warn!(secret = %decl.name, server = %server_config.spec.name, "secret value missing, substituting sentinel");
            UNKNOWN_SECRET.to_string()
        });
        env.push(format!("{}={}", decl.env, value));
    }
}

fn append_env(args: &mut Vec<String>, env: &mut Vec<String>, server_config: &ServerConfig) {
    for entry in &server_config.spec.env {
        let value = if entry.value.contains("{{") {
            evaluate(&entry.value, &server_config.evaluated_config)
        } else {
            expand_shell_vars(&entry.value, env)
        };
        if value.is_empty() {
            continue;
        }
        args.push("-e".to_string());
        args.push(entry.name.clone());
        env.push(format!("{}={}", entry.name, value));
    }
}

/// Expand `$VAR` / `${VAR}` references against the env slice built so far.
fn expand_shell_vars(value: &str, built_env: &[String]) -> String {
    let lookup = |name: &str| -> Option<String> {
        built_env.iter().find_map(|kv| {
            let (k, v) = kv.split_once('=')?;
            (k == name).then(|| v.to_string())
        })
    };
    let mut out = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                    let name: String = chars[i + 2..i + 2 + end].iter().collect();
                    out.push_str(&lookup(&name).unwrap_or_default());
                    i += 2 + end + 1;
                    continue;
                }
            } else if chars[i + 1].is_alphabetic() || chars[i + 1] == '_' {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let name: String = chars[i + 1..j].iter().collect();
                out.push_str(&lookup(&name).unwrap_or_default());
                i = j;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn append_volumes(args: &mut Vec<String>, server_config: &ServerConfig, read_only_hint: Option<bool>, long_lived: bool) {
    for vol in &server_config.spec.volumes {
        let mut value = evaluate(&vol.template, &server_config.evaluated_config);
        if value.is_empty() {
            continue;
        }
        // A long-lived server's volume is never made read-only from a hint
        // alone, even if one was supplied (spec §8 boundary behaviors); an
        // explicit `read_only` on the volume spec itself still applies.
        let read_only = vol.read_only || (!long_lived && read_only_hint.unwrap_or(false));
        if read_only && !long_lived && !value.ends_with(":ro") {
            value.push_str(":ro");
        }
        args.push("-v".to_string());
        args.push(value);
    }
}

fn append_user(args: &mut Vec<String>, server_config: &ServerConfig) {
    if let Some(template) = &server_config.spec.user {
        let value = if template.contains("{{") {
            evaluate(template, &server_config.evaluated_config)
        } else {
            template.clone()
        };
        if !value.is_empty() {
            args.push("-u".to_string());
            args.push(value);
        }
    }
}

fn append_extra_hosts(args: &mut Vec<String>, extra_hosts: &[String]) {
    for host in extra_hosts {
        args.push("--add-host".to_string());
        args.push(host.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnvEntry, SecretDecl, ServerSpec, ServerType, VolumeSpec};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn grafana_config() -> ServerConfig {
        let spec = ServerSpec {
            name: "grafana".into(),
            server_type: Some(ServerType::Server),
            image: Some("grafana/mcp".into()),
            remote: Default::default(),
            sse_endpoint: None,
            oauth: Default::default(),
            secrets: vec![SecretDecl { name: "api_key".into(), env: "GRAFANA_API_KEY".into() }],
            env: vec![EnvEntry { name: "GRAFANA_URL".into(), value: "{{grafana.url}}".into() }],
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
        };
        let mut evaluated_config = BTreeMap::new();
        evaluated_config.insert("grafana".to_string(), json!({"url": "TEST"}));
        let mut secrets = std::collections::HashMap::new();
        secrets.insert("api_key".to_string(), "se://docker/mcp/grafana.api_key".to_string());
        ServerConfig { spec, evaluated_config, secrets }
    }

    #[test]
    fn scenario_one_container_tool_call() {
        let server_config = grafana_config();
        let options = Options { cpus: 1.0, memory: "2Gb".into(), ..Default::default() };
        let result = build_args(&server_config, None, &TargetConfig::default(), &options, &[]);

        assert!(result.args.windows(2).any(|w| w == ["--cpus", "1"]));
        assert!(result.args.windows(2).any(|w| w == ["--memory", "2Gb"]));
        assert!(result.args.windows(2).any(|w| w == ["-l", "docker-mcp-name=grafana"]));
        assert!(result.args.windows(2).any(|w| w == ["-e", "GRAFANA_API_KEY"]));
        assert!(result.args.windows(2).any(|w| w == ["-e", "GRAFANA_URL"]));
        assert!(result.env.contains(&"GRAFANA_API_KEY=se://docker/mcp/grafana.api_key".to_string()));
        assert!(result.env.contains(&"GRAFANA_URL=TEST".to_string()));
    }

    #[test]
    fn no_cpus_or_memory_args_when_unset() {
        let server_config = grafana_config();
        let options = Options::default();
        let result = build_args(&server_config, None, &TargetConfig::default(), &options, &[]);
        assert!(!result.args.contains(&"--cpus".to_string()));
        assert!(!result.args.contains(&"--memory".to_string()));
    }

    #[test]
    fn disable_network_overrides_networks_list() {
        let mut server_config = grafana_config();
        server_config.spec.disable_network = true;
        let options = Options::default();
        let result = build_args(&server_config, None, &TargetConfig::default(), &options, &["bridge".into()]);
        assert!(result.args.windows(2).any(|w| w == ["--network", "none"]));
        assert!(!result.args.iter().any(|a| a == "bridge"));
    }

    #[test]
    fn long_lived_volume_not_forced_read_only() {
        let mut server_config = grafana_config();
        server_config.spec.volumes.push(VolumeSpec { template: "/data:/data".into(), read_only: false });
        server_config.spec.long_lived = true;
        let options = Options { long_lived: true, ..Default::default() };
        let result = build_args(&server_config, Some(true), &TargetConfig::default(), &options, &[]);
        assert!(result.args.contains(&"/data:/data".to_string()));
        assert!(!result.args.contains(&"/data:/data:ro".to_string()));
    }

    #[test]
    fn missing_secret_substitutes_sentinel() {
        let mut server_config = grafana_config();
        server_config.secrets.clear();
        let options = Options::default();
        let result = build_args(&server_config, None, &TargetConfig::default(), &options, &[]);
        assert!(result.env.iter().any(|e| e == "GRAFANA_API_KEY=<UNKNOWN>"));
    }
}
