//! mcp-gatewayd CLI entry point.

use clap::Parser;
use mcp_gateway::config::dao::{InMemoryCatalog, InMemoryProfileDao, PassthroughOciResolver};
use mcp_gateway::config::GatewayOptions;
use mcp_gateway::transport::{self, TokenStore};
use mcp_gateway::Gateway;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Gateway transport modes.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TransportMode {
    Stdio,
    Http,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-gatewayd", about = "MCP gateway daemon")]
struct Cli {
    /// Transport to serve the gateway over.
    #[arg(long, value_enum, default_value = "stdio")]
    transport: TransportMode,

    /// Address to bind when `--transport http` is selected.
    #[arg(long, env = "MCP_GATEWAY_LISTEN_ADDR", default_value = "0.0.0.0:8811")]
    listen_addr: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mcp_gateway=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "gateway exited with error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> mcp_gateway::GatewayResult<()> {
    let mut options = GatewayOptions::load()?;
    if options.listen_addr.is_empty() {
        options.listen_addr = cli.listen_addr.clone();
    }

    // Production deployments supply real implementations of these traits;
    // the in-memory ones here are a usable starting point for local runs.
    let dao = Arc::new(InMemoryProfileDao::new());
    let oci = Arc::new(PassthroughOciResolver);
    let catalog = Arc::new(InMemoryCatalog::new(vec![]));

    let gateway = Arc::new(Gateway::new(options.clone(), dao, oci, catalog).await?);

    match cli.transport {
        TransportMode::Stdio => transport::serve_stdio(gateway).await,
        TransportMode::Http => transport::serve_http(gateway, &options.listen_addr, TokenStore::from_env()).await,
    }
}
