//! L5 — Container argument builder: deterministic mapping from a server
//! spec plus evaluated configuration to an isolated container invocation
//! (spec §4.3, §8 boundary behaviors and end-to-end scenario 1).

mod args;

use async_trait::async_trait;
use std::time::Duration;

pub use args::{build_args, ContainerArgs, Options, TargetConfig};

use crate::config::ImagePuller;
use crate::error::{GatewayError, GatewayResult};

/// Pulls images through the local `docker` CLI, matching the base args'
/// `--pull never` convention: the gateway pulls up front during activation
/// rather than letting a container start silently pull on demand. Pulls use
/// a short timeout (spec "Container pulls and health probes ... use short
/// (1s) timeouts").
pub struct DockerImagePuller;

#[async_trait]
impl ImagePuller for DockerImagePuller {
    async fn pull(&self, image: &str) -> GatewayResult<()> {
        let output = tokio::time::timeout(
            Duration::from_secs(1),
            tokio::process::Command::new("docker").args(["pull", image]).output(),
        )
        .await
        .map_err(|_| GatewayError::backend_connection(format!("pulling '{image}' timed out")))?
        .map_err(|e| GatewayError::backend_connection(e.to_string()))?;

        if !output.status.success() {
            return Err(GatewayError::backend_connection(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(())
    }
}
