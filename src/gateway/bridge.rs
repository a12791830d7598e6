//! Auth bridge — cookie-to-bearer translation in front of the route table.
//!
//! Every inbound request is classified before any routing decision:
//!
//! - **Public auth space** (`/auth/**`): forwarded unmodified.
//! - **Gated space** (any configured route prefix): the session cookie is
//!   bridged into an `Authorization: Bearer <token>` header, overriding
//!   whatever the client sent. Without a cookie the request is redirected
//!   to the login page with a `redirect` parameter carrying the original
//!   path and query so the user lands back where they were heading.
//! - **Unmatched**: forwarded unmodified.
//!
//! The bridge never verifies the token itself — presence is the gate here,
//! verification happens in the backends. A forged or expired token simply
//! comes back from the backend as 401 the same way it would have without
//! a gateway. What the bridge does guarantee is that no unauthenticated
//! request with a gated classification ever reaches the forwarder.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::redirect_found;

/// Login page path; unauthenticated gated requests redirect here.
pub const LOGIN_PATH: &str = "/auth/login";

/// Prefix of the public auth space (login/register/logout).
pub const AUTH_PREFIX: &str = "/auth";

/// Classification of an inbound request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Login/register/logout paths, exempt from gating
    PublicAuth,
    /// Paths owned by a route binding; require a session before forwarding
    Gated,
    /// Everything else; passes through unchanged
    Unmatched,
}

/// Immutable per-process bridge configuration
#[derive(Debug)]
pub struct BridgeConfig {
    /// Session cookie name
    pub cookie_name: String,
    /// Gated path prefixes (the route table's prefixes)
    pub gated_prefixes: Vec<String>,
}

impl BridgeConfig {
    /// Create a bridge config from the cookie name and route prefixes
    #[must_use]
    pub fn new(cookie_name: impl Into<String>, gated_prefixes: Vec<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            gated_prefixes,
        }
    }

    /// Classify a request path
    #[must_use]
    pub fn classify(&self, path: &str) -> PathClass {
        if prefix_matches(AUTH_PREFIX, path) {
            return PathClass::PublicAuth;
        }
        if self
            .gated_prefixes
            .iter()
            .any(|prefix| prefix_matches(prefix, path))
        {
            return PathClass::Gated;
        }
        PathClass::Unmatched
    }
}

/// Segment-aware prefix match: `/ui` owns `/ui` and `/ui/...`, not `/uischema`.
pub(crate) fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Extract the named cookie's value from the request's `Cookie` headers
#[must_use]
pub fn session_cookie_value(request: &Request<Body>, cookie_name: &str) -> Option<String> {
    request
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.to_string())
}

/// The auth bridge middleware.
///
/// Produces a new outbound request value derived from the inbound one; the
/// only mutation is overwriting the `Authorization` header, which is never
/// trusted from the original caller on gated paths.
pub async fn bridge_middleware(
    axum::extract::State(config): axum::extract::State<Arc<BridgeConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match config.classify(&path) {
        PathClass::PublicAuth | PathClass::Unmatched => next.run(request).await,
        PathClass::Gated => {
            let token = session_cookie_value(&request, &config.cookie_name)
                .filter(|t| !t.trim().is_empty());

            match token.and_then(|t| bearer_value(&t)) {
                Some(bearer) => {
                    request.headers_mut().insert(header::AUTHORIZATION, bearer);
                    debug!(path = %path, "Bridged session cookie to Authorization header");
                    next.run(request).await
                }
                None => {
                    let target = login_redirect_target(&path, request.uri().query());
                    debug!(path = %path, "No session cookie, redirecting to login");
                    redirect_found(&target)
                }
            }
        }
    }
}

/// `Bearer <token>` header value; `None` if the token has characters that
/// cannot appear in a header (treated like an absent cookie).
fn bearer_value(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {token}")).ok()
}

/// Build `/auth/login?redirect=<urlencoded original path+query>`
#[must_use]
pub fn login_redirect_target(path: &str, query: Option<&str>) -> String {
    let mut original = path.to_string();
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        original.push('?');
        original.push_str(q);
    }
    let encoded: String = url::form_urlencoded::byte_serialize(original.as_bytes()).collect();
    format!("{LOGIN_PATH}?redirect={encoded}")
}
