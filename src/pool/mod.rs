//! Client pool: M2 (once-only client getter), M3 (proxy runner), H1
//! (the pool itself). Spec §4.2, §4.9, §5.

pub mod client_getter;
pub mod client_pool;
pub mod proxy_runner;

pub use client_getter::{ClientGetter, GetterState};
pub use client_pool::{ClientConfig, ClientPool, PoolKey};
pub use proxy_runner::{ProxyHandle, ProxyRunner};
