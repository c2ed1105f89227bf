//! The live backend MCP client plus cleanup hook (spec §3 "Client"). A
//! type-erased wrapper over the MCP SDK's transport-generic `Client<T>`,
//! grounded on `turbomcp-proxy::proxy::backend::AnyClient` and its
//! `dispatch_client!` macro.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use turbomcp_client::Client;
use turbomcp_protocol::types::{GetPromptResult, Prompt, ReadResourceResult, Resource, Tool};
use turbomcp_transport::{
    child_process::{ChildProcessConfig, ChildProcessTransport},
    http_sse_client::{HttpSseClientConfig, HttpSseClientTransport},
    streamable_http_client::{StreamableHttpClientConfig, StreamableHttpClientTransport},
    Transport, TransportCapabilities, TransportMessage, TransportMetrics, TransportResult,
    TransportState, TransportType,
};

use crate::error::{GatewayError, GatewayResult};

/// An `Arc`-sharing `Transport` adapter. `Client::new` consumes its
/// transport by value, so without this the transport handle used to
/// connect is unreachable again once the client owns it; wrapping it in
/// an `Arc` first and handing the client a clone keeps a second handle
/// around for `disconnect` at session teardown.
#[derive(Debug, Clone)]
struct SharedTransport<T>(Arc<T>);

#[async_trait]
impl<T: Transport> Transport for SharedTransport<T> {
    fn transport_type(&self) -> TransportType {
        self.0.transport_type()
    }

    fn capabilities(&self) -> &TransportCapabilities {
        self.0.capabilities()
    }

    async fn state(&self) -> TransportState {
        self.0.state().await
    }

    async fn connect(&self) -> TransportResult<()> {
        self.0.connect().await
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.0.disconnect().await
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        self.0.send(message).await
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        self.0.receive().await
    }

    async fn metrics(&self) -> TransportMetrics {
        self.0.metrics().await
    }
}

/// One live client session: the SDK client plus the transport handle
/// used to tear it down.
#[derive(Clone)]
struct Session<T: Transport> {
    client: Arc<Client<SharedTransport<T>>>,
    transport: SharedTransport<T>,
}

impl<T: Transport> Session<T> {
    async fn close(&self) {
        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!(error = %e, "error closing backend client session");
        }
    }
}

/// Transport-erased backend client. Holds an `Arc` around each concrete
/// client so cloning (needed to hand the same client to concurrent
/// waiters, spec §4.9) is cheap.
#[derive(Clone)]
pub enum BackendClient {
    Stdio(Session<ChildProcessTransport>),
    Sse(Session<HttpSseClientTransport>),
    StreamableHttp(Session<StreamableHttpClientTransport>),
}

macro_rules! dispatch {
    ($client:expr, $method:ident($($args:expr),*)) => {
        match $client {
            BackendClient::Stdio(s) => s.client.$method($($args),*).await,
            BackendClient::Sse(s) => s.client.$method($($args),*).await,
            BackendClient::StreamableHttp(s) => s.client.$method($($args),*).await,
        }
    };
}

impl BackendClient {
    pub async fn stdio(command: String, args: Vec<String>, env: Vec<(String, String)>) -> GatewayResult<Self> {
        let config = ChildProcessConfig {
            command,
            args,
            environment: Some(env.into_iter().collect()),
            ..Default::default()
        };
        let transport = ChildProcessTransport::new(config);
        transport.connect().await.map_err(|e| GatewayError::backend_connection(e.to_string()))?;
        let transport = SharedTransport(Arc::new(transport));
        let mut client = Client::new(transport.clone());
        client.initialize().await.map_err(|e| GatewayError::backend_connection(e.to_string()))?;
        Ok(Self::Stdio(Session { client: Arc::new(client), transport }))
    }

    pub async fn sse(url: String, headers: HashMap<String, String>) -> GatewayResult<Self> {
        let config = HttpSseClientConfig { url, headers, ..Default::default() };
        let transport = HttpSseClientTransport::new(config);
        transport.connect().await.map_err(|e| GatewayError::backend_connection(e.to_string()))?;
        let transport = SharedTransport(Arc::new(transport));
        let mut client = Client::new(transport.clone());
        client.initialize().await.map_err(|e| GatewayError::backend_connection(e.to_string()))?;
        Ok(Self::Sse(Session { client: Arc::new(client), transport }))
    }

    pub async fn streamable_http(url: String, headers: HashMap<String, String>) -> GatewayResult<Self> {
        let config = StreamableHttpClientConfig {
            base_url: url,
            endpoint_path: "/mcp".to_string(),
            timeout: std::time::Duration::from_secs(30),
            headers,
            ..Default::default()
        };
        let transport = StreamableHttpClientTransport::new(config);
        transport.connect().await.map_err(|e| GatewayError::backend_connection(e.to_string()))?;
        let transport = SharedTransport(Arc::new(transport));
        let mut client = Client::new(transport.clone());
        client.initialize().await.map_err(|e| GatewayError::backend_connection(e.to_string()))?;
        Ok(Self::StreamableHttp(Session { client: Arc::new(client), transport }))
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<HashMap<String, Value>>) -> GatewayResult<Value> {
        dispatch!(self, call_tool(name, arguments)).map_err(|e| GatewayError::backend(e.to_string()))
    }

    pub async fn list_tools(&self) -> GatewayResult<Vec<Tool>> {
        dispatch!(self, list_tools()).map_err(|e| GatewayError::backend(e.to_string()))
    }

    pub async fn list_resources(&self) -> GatewayResult<Vec<Resource>> {
        dispatch!(self, list_resources()).map_err(|e| GatewayError::backend(e.to_string()))
    }

    pub async fn read_resource(&self, uri: &str) -> GatewayResult<ReadResourceResult> {
        dispatch!(self, read_resource(uri)).map_err(|e| GatewayError::backend(e.to_string()))
    }

    pub async fn list_prompts(&self) -> GatewayResult<Vec<Prompt>> {
        dispatch!(self, list_prompts()).map_err(|e| GatewayError::backend(e.to_string()))
    }

    pub async fn get_prompt(&self, name: &str, arguments: Option<HashMap<String, Value>>) -> GatewayResult<GetPromptResult> {
        dispatch!(self, get_prompt(name, arguments)).map_err(|e| GatewayError::backend(e.to_string()))
    }

    /// Record an updated roots list for the running client (H1
    /// `UpdateRoots`). The vendored client SDK only lets a client answer a
    /// server-initiated `roots/list` request through a handler registered
    /// before `initialize`; it has no call that pushes a changed roots list
    /// into an already-initialized session, so there is nothing live to
    /// forward here. This logs the request rather than pretending to apply
    /// it, and the pool still treats the new value as current for the next
    /// session this key initializes.
    pub async fn update_roots(&self, roots: Vec<String>) -> GatewayResult<()> {
        tracing::debug!(
            count = roots.len(),
            "roots updated; backend SDK has no live push, will apply on next session init"
        );
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            BackendClient::Stdio(s) => s.close().await,
            BackendClient::Sse(s) => s.close().await,
            BackendClient::StreamableHttp(s) => s.close().await,
        }
    }
}
