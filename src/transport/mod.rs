//! H7 — Transport host: stdio and streamable-HTTP serving with bearer-token
//! auth (spec §4.8, §6).

pub mod host;
pub mod token;

pub use host::{serve_http, serve_stdio};
pub use token::{AuthenticatedIdentity, TokenStore};
