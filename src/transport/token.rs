//! Bearer-token auth for the transport host (spec §6 "auth token"). Grounded
//! on `turbomcp-auth::api_key_validation` (blake3 pre-hash + constant-time
//! comparison) and `turbomcp-auth::server::WwwAuthenticateBuilder`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::Rng;
use subtle::ConstantTimeEq;

/// Length of a generated auth token (spec §6: 50-char `[a-z0-9]`).
const TOKEN_LENGTH: usize = 50;
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn hash(value: &str) -> [u8; 32] {
    blake3::hash(value.as_bytes()).into()
}

/// One accepted credential: an identity label plus the token that proves it.
#[derive(Debug, Clone)]
struct Identity {
    name: String,
    token: String,
}

/// Constant-time lookup across every accepted identity (spec §6
/// "multi-identity token store"). Total time is O(n) in the number of
/// identities but independent of which one matches or where a mismatch
/// occurs; the caller never learns more than "matched" or "didn't".
fn find_match<'a>(provided: &str, identities: &'a [Identity]) -> Option<&'a str> {
    let provided_hash = hash(provided);
    let mut matched = None;
    for identity in identities {
        let expected_hash = hash(&identity.token);
        if bool::from(provided_hash.ct_eq(&expected_hash)) {
            matched = Some(identity.name.as_str());
        }
    }
    matched
}

/// Generate a fresh CSPRNG-backed token of the gateway's canonical shape.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// The set of tokens accepted as valid, loaded from
/// `MCP_GATEWAY_AUTH_TOKENS` as comma-separated `identity:token` pairs
/// (SPEC_FULL.md §E), so old and new credentials can both be valid during
/// a rollover window and audit events can attribute a call to the
/// identity that authenticated it rather than the raw token.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    identities: Vec<Identity>,
}

impl TokenStore {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { identities: pairs.into_iter().map(|(name, token)| Identity { name, token }).collect() }
    }

    pub fn from_env() -> Self {
        let raw = std::env::var("MCP_GATEWAY_AUTH_TOKENS").unwrap_or_default();
        let identities = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|entry| entry.split_once(':'))
            .map(|(name, token)| Identity { name: name.to_string(), token: token.to_string() })
            .collect();
        Self { identities }
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn accepts(&self, provided: &str) -> bool {
        self.identity_for(provided).is_some()
    }

    /// The identity label for a matching token, if any.
    pub fn identity_for(&self, provided: &str) -> Option<&str> {
        if self.identities.is_empty() {
            return None;
        }
        find_match(provided, &self.identities)
    }
}

/// The identity that authenticated a request, attached as a request
/// extension (SPEC_FULL.md §E) so handlers can tag audit events with
/// `clientName` without re-deriving it from the raw token.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub String);

/// Axum middleware enforcing bearer-token auth on every route except
/// `/health` (spec §6 "health exemption"). Accepts the token via the
/// `Authorization: Bearer <token>` header, a `token` query parameter, or
/// HTTP Basic auth with the token as the password (spec §6 auth variants).
pub async fn require_token(
    State(store): State<std::sync::Arc<TokenStore>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let provided = extract_token(&request);
    match provided.as_deref().and_then(|token| store.identity_for(token)) {
        Some(identity) => {
            request.extensions_mut().insert(AuthenticatedIdentity(identity.to_string()));
            next.run(request).await
        }
        None => unauthorized(),
    }
}

fn extract_token(request: &Request<Body>) -> Option<String> {
    if let Some(header) = request.headers().get(axum::http::header::AUTHORIZATION) {
        let value = header.to_str().ok()?;
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
        if let Some(token) = value.strip_prefix("Basic ") {
            use base64::Engine;
            let decoded = base64::engine::general_purpose::STANDARD.decode(token).ok()?;
            let decoded = String::from_utf8(decoded).ok()?;
            let (_, password) = decoded.split_once(':')?;
            return Some(password.to_string());
        }
    }

    request.uri().query().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    })
}

fn unauthorized() -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response.headers_mut().insert(
        axum::http::header::WWW_AUTHENTICATE,
        axum::http::HeaderValue::from_static("Bearer realm=\"mcp-gateway\""),
    );
    response
}
