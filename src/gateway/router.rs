//! HTTP router and the proxy fallback handler

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::warn;

use crate::config::SessionConfig;
use crate::credentials::CredentialStore;
use crate::token::TokenService;

use super::bridge::{BridgeConfig, LOGIN_PATH, bridge_middleware};
use super::forward::Forwarder;
use super::session;

/// Shared application state
pub struct AppState {
    /// Session cookie settings
    pub session: SessionConfig,
    /// Identity token service
    pub tokens: TokenService,
    /// Credential store
    pub users: Arc<dyn CredentialStore>,
    /// One forwarder per route binding
    pub forwarders: Vec<Forwarder>,
    /// Largest request body accepted for forwarding
    pub max_body_bytes: usize,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let bridge = Arc::new(BridgeConfig::new(
        state.session.cookie_name.clone(),
        state
            .forwarders
            .iter()
            .map(|f| f.prefix().to_string())
            .collect(),
    ));

    Router::new()
        .route("/", get(session::home))
        .route("/health", get(health_handler))
        .route(LOGIN_PATH, get(session::login_page).post(session::login))
        .route(
            session::REGISTER_PATH,
            get(session::register_page).post(session::register),
        )
        .route("/auth/logout", post(session::logout))
        .fallback(proxy_handler)
        // The bridge runs before routing: gated traffic is redirected or
        // carries a synthesized identity header by the time it is matched.
        .layer(middleware::from_fn_with_state(bridge, bridge_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness probe
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "medigate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fallback handler: longest-prefix route lookup, then relay.
///
/// Anything that reaches this point is either gated traffic the bridge has
/// already stamped with an identity header, or an unmatched path (404).
async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(String::from);

    let Some(forwarder) = state
        .forwarders
        .iter()
        .filter(|f| f.matches(&path))
        .max_by_key(|f| f.prefix().len())
    else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    let method = request.method().clone();
    let (parts, body) = request.into_parts();

    let body_bytes = if matches!(method, Method::POST | Method::PUT | Method::PATCH) {
        match axum::body::to_bytes(body, state.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to read request body");
                return (StatusCode::BAD_REQUEST, "Invalid request body").into_response();
            }
        }
    } else {
        bytes::Bytes::new()
    };

    forwarder
        .forward(&method, &path, query.as_deref(), &parts.headers, body_bytes)
        .await
}
