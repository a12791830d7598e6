//! Gateway server implementation

pub mod bridge;
pub mod forward;
pub mod router;
pub mod server;
pub mod session;

pub use bridge::{BridgeConfig, PathClass, bridge_middleware};
pub use forward::{Forwarder, RouteBinding};
pub use router::{AppState, create_router};
pub use server::Gateway;

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

/// 302 Found redirect, the browser-facing redirect form used everywhere in
/// the auth flow.
pub(crate) fn redirect_found(location: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    let value = HeaderValue::from_str(location)
        .unwrap_or_else(|_| HeaderValue::from_static(bridge::LOGIN_PATH));
    response.headers_mut().insert(header::LOCATION, value);
    response
}
