//! Error types for the gateway.
//!
//! Follows the same 3-tier shape as the MCP SDK's own error hierarchy:
//! protocol errors are preserved verbatim (error codes matter for
//! forwarding), transport errors convert automatically, and everything
//! gateway-specific gets a structured, non-exhaustive variant.

use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Protocol-level error from the MCP SDK layer. Preserves error codes
    /// (e.g. -1 for user rejection) so they survive the round trip.
    #[error("protocol error: {0}")]
    Protocol(#[from] Box<turbomcp_protocol::Error>),

    /// Transport layer error, converted automatically.
    #[error("transport error: {0}")]
    Transport(#[from] turbomcp_transport::TransportError),

    /// Profile, catalog, or working-set configuration is missing or malformed.
    #[error("configuration error: {message}")]
    Configuration { message: String, key: Option<String> },

    /// A policy request could not be evaluated, or was evaluated as a deny.
    /// Fail-closed: this is surfaced to callers, never silently downgraded.
    #[error("policy error: {message}")]
    Policy { message: String, reason: Option<String> },

    /// Duplicate case-variant keys were detected in a critical method's
    /// argument tree (spec §4.7 / §7).
    #[error("validation failed for {method}: {message}")]
    Validation { method: String, message: String },

    /// Backend MCP client failed to initialize.
    #[error("backend connection error: {message}")]
    BackendConnection { message: String, server: Option<String> },

    /// Backend MCP server returned an error for a forwarded call.
    #[error("backend error: {message}")]
    Backend { message: String, operation: Option<String> },

    /// Secrets engine or credential helper failure.
    #[error("secrets error: {message}")]
    Secrets { message: String },

    /// Profile activation pre-flight failed for one or more servers.
    #[error("profile activation failed: {message}")]
    ProfileActivation { message: String },

    /// Container argument assembly failed (should only happen on malformed specs).
    #[error("container argument error: {message}")]
    ContainerArgs { message: String },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem / process I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error talking to policy service, secrets engine, or catalog.
    #[error("http error: {message}")]
    Http { message: String, status_code: Option<u16> },
}

impl GatewayError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), key: None }
    }

    pub fn configuration_with_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), key: Some(key.into()) }
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy { message: message.into(), reason: None }
    }

    pub fn policy_denied(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Policy { message: format!("denied: {reason}"), reason: Some(reason) }
    }

    pub fn validation(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { method: method.into(), message: message.into() }
    }

    pub fn backend_connection(message: impl Into<String>) -> Self {
        Self::BackendConnection { message: message.into(), server: None }
    }

    pub fn backend_connection_for(message: impl Into<String>, server: impl Into<String>) -> Self {
        Self::BackendConnection { message: message.into(), server: Some(server.into()) }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into(), operation: None }
    }

    pub fn secrets(message: impl Into<String>) -> Self {
        Self::Secrets { message: message.into() }
    }

    pub fn profile_activation(message: impl Into<String>) -> Self {
        Self::ProfileActivation { message: message.into() }
    }

    pub fn container_args(message: impl Into<String>) -> Self {
        Self::ContainerArgs { message: message.into() }
    }

    /// Free-text transport error not originating from the MCP SDK's own
    /// `TransportError` (socket bind failures, stdio I/O framing).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::BackendConnection { message: message.into(), server: None }
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::Http { message: message.into(), status_code: None }
    }

    pub fn http_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Http { message: message.into(), status_code: Some(status_code) }
    }

    /// Strip internal detail before handing a message to a client. Management
    /// tool failures surface as `CallToolResult` text (spec §7), never as a
    /// protocol error, so this is what gets embedded there.
    pub fn sanitize(&self) -> String {
        match self {
            Self::Protocol(_) => "protocol error occurred".to_string(),
            Self::Transport(_) => "transport error occurred".to_string(),
            Self::Configuration { message, .. } => format!("configuration error: {message}"),
            Self::Policy { message, .. } => message.clone(),
            Self::Validation { method, message } => format!("validation failed for {method}: {message}"),
            Self::BackendConnection { message, .. } => format!("backend connection failed: {message}"),
            Self::Backend { message, .. } => format!("backend error: {message}"),
            Self::Secrets { message } => format!("secrets error: {message}"),
            Self::ProfileActivation { message } => message.clone(),
            Self::ContainerArgs { message } => format!("container argument error: {message}"),
            Self::Serialization(_) => "data serialization error".to_string(),
            Self::Io(_) => "io error occurred".to_string(),
            Self::Http { status_code: Some(code), .. } => format!("http error {code}"),
            Self::Http { .. } => "http error occurred".to_string(),
        }
    }

    /// Whether fail-closed semantics apply: an error on the policy path must
    /// refuse the operation exactly as a `allowed=false` decision would.
    pub fn is_policy_error(&self) -> bool {
        matches!(self, Self::Policy { .. })
    }
}

/// Extension trait mirroring the teacher's `ProxyErrorExt`: attach context to
/// a foreign error while converting it into a `GatewayError`.
pub trait GatewayErrorExt<T> {
    fn backend_context(self, server: impl Into<String>) -> GatewayResult<T>;
    fn config_context(self, key: impl Into<String>) -> GatewayResult<T>;
}

impl<T, E> GatewayErrorExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn backend_context(self, server: impl Into<String>) -> GatewayResult<T> {
        self.map_err(|e| GatewayError::backend_connection_for(e.to_string(), server))
    }

    fn config_context(self, key: impl Into<String>) -> GatewayResult<T> {
        self.map_err(|e| GatewayError::configuration_with_key(e.to_string(), key))
    }
}
