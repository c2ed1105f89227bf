//! H9 — OAuth header injector: attaches a bearer token to requests bound
//! for a remote server configured with an OAuth provider, sourcing the
//! token from a pluggable credential helper (spec §4.1 "remote + OAuth").
//! Grounded on `turbomcp-auth::manager::AuthManager`'s provider-keyed
//! lookup and `turbomcp-auth::oauth2::client`'s `TokenInfo`/expiry shape,
//! simplified to the gateway's injector-only role — token *acquisition*
//! (the full authorization-code/refresh flows) is delegated to the
//! external credential helper, not reimplemented here.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::warn;

use crate::error::GatewayResult;
use crate::model::ServerSpec;

/// A resolved bearer token plus its expiry, mirroring the shape the
/// credential helper process returns.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub expires_at: Option<SystemTime>,
}

impl TokenInfo {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            // Treat tokens within 30s of expiry as already expired, same
            // margin the teacher's oauth2 client uses to avoid a request
            // racing a just-expired token.
            Some(expiry) => SystemTime::now() + Duration::from_secs(30) >= expiry,
            None => false,
        }
    }
}

/// Obtains bearer tokens for a named OAuth provider. The concrete
/// implementation talks to whatever external credential store the
/// deployment uses; this crate only defines the seam.
#[async_trait]
pub trait CredentialHelper: Send + Sync {
    async fn access_token(&self, provider: &str) -> GatewayResult<TokenInfo>;

    /// Invalidate a cached token, forcing the next `access_token` call to
    /// refresh. Called when a backend rejects a previously-valid token.
    async fn invalidate(&self, provider: &str);
}

/// Injects an `Authorization: Bearer <token>` header into the headers map
/// passed to a remote transport, for every server spec that declares an
/// OAuth provider (spec §3 "OAuth Config").
pub struct OAuthHeaderInjector {
    helper: Arc<dyn CredentialHelper>,
}

impl OAuthHeaderInjector {
    pub fn new(helper: Arc<dyn CredentialHelper>) -> Self {
        Self { helper }
    }

    /// Whether `spec` requires OAuth header injection at all.
    pub fn applies(spec: &ServerSpec) -> bool {
        spec.is_remote() && !spec.oauth.providers.is_empty()
    }

    /// Build the header map to merge into a remote transport's base
    /// headers. Returns the spec's configured headers unchanged if no
    /// OAuth provider applies.
    pub async fn build_headers(&self, spec: &ServerSpec) -> GatewayResult<BTreeMap<String, String>> {
        let mut headers = spec.remote.headers.clone();
        if !Self::applies(spec) {
            return Ok(headers);
        }

        let provider = &spec.oauth.providers[0].provider;
        let token = self.helper.access_token(provider).await?;
        if token.is_expired() {
            warn!(provider, "credential helper returned an already-expired token");
        }
        headers.insert("Authorization".to_string(), format!("Bearer {}", token.access_token));
        Ok(headers)
    }

    /// Invalidate the cached token for every OAuth provider a spec
    /// declares; called alongside `ClientPool::invalidate_oauth_clients`
    /// when a 401 is observed on a remote call.
    pub async fn invalidate(&self, spec: &ServerSpec) {
        for provider in &spec.oauth.providers {
            self.helper.invalidate(&provider.provider).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OAuthConfig, OAuthProvider, RemoteConfig, RemoteTransport, ServerSpec, ServerType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct FixedHelper {
        calls: AtomicUsize,
        invalidated: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CredentialHelper for FixedHelper {
        async fn access_token(&self, _provider: &str) -> GatewayResult<TokenInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TokenInfo { access_token: "tok123".into(), expires_at: None })
        }

        async fn invalidate(&self, provider: &str) {
            self.invalidated.lock().await.push(provider.to_string());
        }
    }

    fn remote_spec(with_oauth: bool) -> ServerSpec {
        ServerSpec {
            name: "svc".into(),
            server_type: Some(ServerType::Remote),
            image: None,
            remote: RemoteConfig {
                url: Some("https://example.com/mcp".into()),
                transport: Some(RemoteTransport::StreamableHttp),
                headers: BTreeMap::new(),
            },
            sse_endpoint: None,
            oauth: if with_oauth {
                OAuthConfig { providers: vec![OAuthProvider { provider: "github".into() }], scopes: vec![] }
            } else {
                OAuthConfig::default()
            },
            secrets: vec![],
            env: vec![],
            command: vec![],
            volumes: vec![],
            user: None,
            disable_network: false,
            allow_hosts: vec![],
            extra_hosts: vec![],
            long_lived: false,
            tools: vec![],
            config: vec![],
            secrets_provider: None,
        }
    }

    #[tokio::test]
    async fn injects_bearer_header_for_oauth_servers() {
        let helper = Arc::new(FixedHelper { calls: AtomicUsize::new(0), invalidated: Mutex::new(vec![]) });
        let injector = OAuthHeaderInjector::new(helper.clone());
        let headers = injector.build_headers(&remote_spec(true)).await.unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer tok123");
        assert_eq!(helper.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_inject_for_non_oauth_servers() {
        let helper = Arc::new(FixedHelper { calls: AtomicUsize::new(0), invalidated: Mutex::new(vec![]) });
        let injector = OAuthHeaderInjector::new(helper.clone());
        let headers = injector.build_headers(&remote_spec(false)).await.unwrap();
        assert!(!headers.contains_key("Authorization"));
        assert_eq!(helper.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalidate_reaches_the_declared_provider() {
        let helper = Arc::new(FixedHelper { calls: AtomicUsize::new(0), invalidated: Mutex::new(vec![]) });
        let injector = OAuthHeaderInjector::new(helper.clone());
        injector.invalidate(&remote_spec(true)).await;
        assert_eq!(helper.invalidated.lock().await.as_slice(), ["github".to_string()]);
    }
}
