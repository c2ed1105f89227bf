//! mcp-gateway: a multiplexing broker that aggregates heterogeneous MCP
//! servers — local containers, remote HTTP/SSE endpoints, POCI tool
//! invocations — behind one MCP-compliant endpoint, enforcing policy and
//! audit on every call.
//!
//! Composes `turbomcp-protocol`, `turbomcp-transport`, and
//! `turbomcp-client` as its MCP SDK rather than reimplementing the
//! protocol; this crate's own code is the gateway logic layered on top.

pub mod backend;
pub mod capability;
pub mod config;
pub mod container;
pub mod error;
pub mod expr;
pub mod gateway;
pub mod handlers;
pub mod model;
pub mod oauth;
pub mod policy;
pub mod pool;
pub mod profile;
pub mod secrets;
pub mod telemetry;
pub mod transport;
pub mod validation;

pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
