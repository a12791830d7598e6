//! Reverse-proxy forwarder — literal path rewrite and relay to one backend.
//!
//! One `Forwarder` exists per route binding (API traffic, UI traffic); the
//! algorithm is identical, only the binding differs:
//!
//! 1. Strip the matched prefix; an empty remainder becomes `/`.
//! 2. Target = backend base (trailing `/` removed) + stripped path + query.
//!    The rewrite is literal, never semantic.
//! 3. Forward the method (unrecognized tokens fall back to GET), an
//!    allow-list of headers, and the body for methods that carry one.
//! 4. Backend responses — including 4xx/5xx — pass through byte-for-byte,
//!    with `Location` exposed to browsers. Connectivity failures and
//!    anything else that goes wrong become a 502 with a short plain-text
//!    diagnostic; nothing escapes the proxy boundary as a crash.

use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::{Error, Result};

/// Headers copied from the inbound request to the outbound one.
/// Everything else is dropped.
const FORWARDED_HEADERS: [header::HeaderName; 6] = [
    header::AUTHORIZATION,
    header::COOKIE,
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
    header::USER_AGENT,
    header::CONTENT_TYPE,
];

/// Static prefix -> backend base-address binding
#[derive(Debug, Clone)]
pub struct RouteBinding {
    /// Path prefix owned by this binding
    pub prefix: String,
    /// Backend base address
    pub backend: String,
}

/// Relays requests under one path prefix to one backend.
///
/// Holds its own pooled HTTP client; the client-level timeout bounds every
/// backend call, and its expiry is indistinguishable from a connectivity
/// failure (502).
pub struct Forwarder {
    binding: RouteBinding,
    client: reqwest::Client,
    diagnostic_limit: usize,
}

impl Forwarder {
    /// Create a forwarder for one route binding.
    pub fn new(binding: RouteBinding, timeout: Duration, diagnostic_limit: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            binding,
            client,
            diagnostic_limit,
        })
    }

    /// The bound path prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.binding.prefix
    }

    /// Whether this forwarder owns `path`
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        super::bridge::prefix_matches(&self.binding.prefix, path)
    }

    /// Build the outbound target URI for an inbound path and query
    #[must_use]
    pub fn target_for(&self, path: &str, query: Option<&str>) -> String {
        let base = self.binding.backend.trim_end_matches('/');
        let stripped = path.strip_prefix(&self.binding.prefix).unwrap_or(path);
        let normalized = if stripped.is_empty() { "/" } else { stripped };

        match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{base}{normalized}?{q}"),
            None => format!("{base}{normalized}"),
        }
    }

    /// Forward one request and map the outcome to a response.
    pub async fn forward(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response {
        let target = self.target_for(path, query);
        let outbound_method = map_method(method);
        let carries_body = method_carries_body(&outbound_method);

        debug!(method = %outbound_method, target = %target, "Forwarding");

        let mut request = self
            .client
            .request(outbound_method, &target)
            .headers(copy_allowed_headers(headers));
        if carries_body {
            request = request.body(body);
        }

        match request.send().await {
            Ok(backend_response) => self.passthrough(backend_response, &target).await,
            Err(e) if e.is_connect() || e.is_timeout() => {
                error!(target = %target, error = %e, "Backend unreachable");
                self.bad_gateway(format!(
                    "Bad Gateway: cannot reach {}",
                    truncate(&target, self.diagnostic_limit)
                ))
            }
            Err(e) => {
                error!(target = %target, error = %e, "Unexpected forwarding error");
                self.bad_gateway(format!(
                    "Bad Gateway to {}",
                    truncate(&target, self.diagnostic_limit)
                ))
            }
        }
    }

    /// Relay the backend's status, headers, and raw body without
    /// reinterpretation. Backend error statuses are not the gateway's errors.
    async fn passthrough(&self, backend_response: reqwest::Response, target: &str) -> Response {
        let status = backend_response.status();
        let mut headers = backend_response.headers().clone();

        if status.is_client_error() || status.is_server_error() {
            warn!(target = %target, status = %status, "Backend returned error status");
        }

        let body = match backend_response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(target = %target, error = %e, "Failed to read backend body");
                return self.bad_gateway(format!(
                    "Bad Gateway to {}",
                    truncate(target, self.diagnostic_limit)
                ));
            }
        };

        // Hop-by-hop and framing headers belong to this server's own
        // connection, not the relayed payload.
        headers.remove(header::CONNECTION);
        headers.remove(header::TRANSFER_ENCODING);
        headers.remove(header::CONTENT_LENGTH);
        headers.append(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Location"),
        );

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn bad_gateway(&self, diagnostic: String) -> Response {
        let mut response = Response::new(Body::from(diagnostic));
        *response.status_mut() = StatusCode::BAD_GATEWAY;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

/// Map the inbound method verbatim, falling back to GET for anything that is
/// not a recognized method token.
fn map_method(method: &Method) -> Method {
    match *method {
        Method::GET
        | Method::POST
        | Method::PUT
        | Method::PATCH
        | Method::DELETE
        | Method::HEAD
        | Method::OPTIONS
        | Method::TRACE => method.clone(),
        _ => Method::GET,
    }
}

/// Only POST/PUT/PATCH conventionally carry a request body.
fn method_carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Copy the allow-listed headers, preserving multi-valued headers as
/// multiple values rather than merging them.
fn copy_allowed_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::new();
    for name in &FORWARDED_HEADERS {
        for value in inbound.get_all(name) {
            outbound.append(name.clone(), value.clone());
        }
    }
    outbound
}

/// Bounded-length diagnostic text, cut at a char boundary.
fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
