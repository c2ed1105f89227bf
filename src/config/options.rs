//! Ambient global options, loaded via the `config` crate from a TOML file
//! plus `MCP_GATEWAY_*` environment overrides (SPEC_FULL.md §C), feeding
//! both the container arg builder (L5 `Options`) and the client pool's
//! `globalLongLived` / `disableNetwork` switches.

use serde::{Deserialize, Serialize};

use crate::container::Options as ContainerOptions;
use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayOptions {
    pub cpus: f64,
    pub memory: String,
    pub verbose: bool,
    pub static_mode: bool,
    pub block_network: bool,
    pub long_lived: bool,
    pub disable_network: bool,
    /// Base URL of the policy service (spec §6).
    pub policy_base_url: String,
    /// Gateway bind address for the transport host (H7).
    pub listen_addr: String,
}

impl GatewayOptions {
    pub fn load() -> GatewayResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("gateway").required(false))
            .add_source(config::Environment::with_prefix("MCP_GATEWAY").separator("_"))
            .build()
            .map_err(|e| GatewayError::configuration(e.to_string()))?;
        settings.try_deserialize().map_err(|e| GatewayError::configuration(e.to_string()))
    }

    pub fn as_container_options(&self) -> ContainerOptions {
        ContainerOptions {
            cpus: self.cpus,
            memory: self.memory.clone(),
            verbose: self.verbose,
            static_mode: self.static_mode,
            block_network: self.block_network,
            long_lived: self.long_lived,
            disable_network: self.disable_network,
        }
    }
}
