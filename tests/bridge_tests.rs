//! End-to-end auth bridge tests
//!
//! Drives a router wrapped in the bridge middleware with an echo handler in
//! place of the forwarder, so the tests observe exactly what a backend
//! would receive: the synthesized identity header, or nothing.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    middleware,
    routing::get,
};
use medigate::gateway::{BridgeConfig, bridge_middleware};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

/// Echo back the Authorization header a backend would see
async fn echo_authorization(request: Request<Body>) -> String {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none")
        .to_string()
}

fn bridged_app() -> Router {
    let bridge = Arc::new(BridgeConfig::new(
        "JWT_TOKEN",
        vec!["/api".to_string(), "/ui".to_string()],
    ));

    Router::new()
        .route("/auth/probe", get(echo_authorization))
        .fallback(echo_authorization)
        .layer(middleware::from_fn_with_state(bridge, bridge_middleware))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn gated_path_without_cookie_redirects_to_login() {
    let response = bridged_app()
        .oneshot(
            Request::builder()
                .uri("/ui/patients?page=2&q=Jane Doe".replace(' ', "%20"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    // Percent-decoding the redirect parameter restores the original
    // path and query exactly.
    let encoded = location.strip_prefix("/auth/login?redirect=").unwrap();
    let decoded: String = url::form_urlencoded::parse(format!("r={encoded}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(decoded, "/ui/patients?page=2&q=Jane%20Doe");
}

#[tokio::test]
async fn gated_path_with_cookie_gets_bearer_header() {
    let response = bridged_app()
        .oneshot(
            Request::builder()
                .uri("/api/patients")
                .header(header::COOKIE, "JWT_TOKEN=my.session.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Bearer my.session.token");
}

#[tokio::test]
async fn client_supplied_authorization_is_overridden_on_gated_paths() {
    let response = bridged_app()
        .oneshot(
            Request::builder()
                .uri("/api/patients")
                .header(header::AUTHORIZATION, "Bearer forged-by-client")
                .header(header::COOKIE, "JWT_TOKEN=real.session.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(body_string(response).await, "Bearer real.session.token");
}

#[tokio::test]
async fn auth_space_gets_no_injected_header_even_with_cookie() {
    let response = bridged_app()
        .oneshot(
            Request::builder()
                .uri("/auth/probe")
                .header(header::COOKIE, "JWT_TOKEN=my.session.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "none");
}

#[tokio::test]
async fn blank_cookie_is_treated_as_absent() {
    let response = bridged_app()
        .oneshot(
            Request::builder()
                .uri("/ui/patients")
                .header(header::COOKIE, "JWT_TOKEN=")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn unmatched_paths_pass_through_unchanged() {
    let response = bridged_app()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header(header::AUTHORIZATION, "Bearer client-supplied")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // No gating, no rewriting: the client's own header survives.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Bearer client-supplied");
}
