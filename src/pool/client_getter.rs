//! M2 — Client getter: once-only initialization of a single backend MCP
//! client, wrapping the MCP SDK, carrying a per-instance cleanup hook
//! (spec §3 "Client", §4.9 state machine, Invariant 3).
//!
//! `Uninitialized -> Initializing -> Ready | Failed`. The transition out
//! of `Uninitialized` is guarded by a one-shot latch (`tokio::sync::OnceCell`)
//! so exactly one caller executes the construction closure; concurrent
//! callers coalesce onto the same future.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::backend::BackendClient;
use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetterState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// One-shot latch around a backend client's construction. `Failed` is
/// modeled by caching the stringified error: once construction fails, the
/// getter itself is discarded by the pool (so every *subsequent* acquire
/// for that key re-runs initialization from a fresh getter), but every
/// waiter *already polling this instance's future* observes the same error.
pub struct ClientGetter {
    cell: OnceCell<Result<BackendClient, String>>,
}

impl ClientGetter {
    pub fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    pub fn state(&self) -> GetterState {
        match self.cell.get() {
            None => GetterState::Uninitialized,
            Some(Ok(_)) => GetterState::Ready,
            Some(Err(_)) => GetterState::Failed,
        }
    }

    /// Get the client, running `init` at most once regardless of how many
    /// callers race to call this concurrently.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> GatewayResult<BackendClient>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<BackendClient>>,
    {
        let result = self
            .cell
            .get_or_init(|| async move { init().await.map_err(|e| e.to_string()) })
            .await;
        match result {
            Ok(client) => Ok(client.clone()),
            Err(message) => Err(GatewayError::backend_connection(message.clone())),
        }
    }
}

impl Default for ClientGetter {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedGetter = Arc<ClientGetter>;
