//! Forwarder integration tests against a live local backend
//!
//! Each test spawns a throwaway axum backend on an ephemeral port and
//! points a `Forwarder` at it, exercising the real reqwest path: literal
//! URI rewrite, header allow-list, body rules, verbatim status/body
//! pass-through, and the 502 contract for unreachable targets.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::IntoResponse,
    routing::{get, post},
};
use medigate::gateway::{Forwarder, RouteBinding};
use pretty_assertions::assert_eq;
use serde_json::json;

async fn spawn_backend(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn forwarder_to(addr: SocketAddr, prefix: &str, base_suffix: &str) -> Forwarder {
    Forwarder::new(
        RouteBinding {
            prefix: prefix.to_string(),
            backend: format!("http://{addr}{base_suffix}"),
        },
        Duration::from_secs(2),
        500,
    )
    .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn backend_error_status_and_body_pass_through_verbatim() {
    let app = Router::new().route(
        "/api/patients/99",
        get(|| async { (StatusCode::NOT_FOUND, r#"{"error":"not found"}"#) }),
    );
    let addr = spawn_backend(app).await;
    let forwarder = forwarder_to(addr, "/api", "/api");

    let response = forwarder
        .forward(
            &Method::GET,
            "/api/patients/99",
            None,
            &HeaderMap::new(),
            Bytes::new(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
            .unwrap(),
        "Location"
    );
    assert_eq!(body_string(response).await, r#"{"error":"not found"}"#);
}

#[tokio::test]
async fn path_is_rewritten_literally_with_query_preserved() {
    let app = Router::new().route(
        "/api/patients",
        get(|uri: Uri| async move { uri.to_string() }),
    );
    let addr = spawn_backend(app).await;
    let forwarder = forwarder_to(addr, "/api", "/api");

    let response = forwarder
        .forward(
            &Method::GET,
            "/api/patients",
            Some("q=Doe"),
            &HeaderMap::new(),
            Bytes::new(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "/api/patients?q=Doe");
}

#[tokio::test]
async fn post_body_is_forwarded_get_body_is_not() {
    let app = Router::new().route(
        "/notes",
        post(|body: String| async move { body }).get(|body: String| async move { body }),
    );
    let addr = spawn_backend(app).await;
    let forwarder = forwarder_to(addr, "/api", "");

    let payload = Bytes::from(r#"{"note":"patient stable"}"#);

    let response = forwarder
        .forward(
            &Method::POST,
            "/api/notes",
            None,
            &HeaderMap::new(),
            payload.clone(),
        )
        .await;
    assert_eq!(body_string(response).await, r#"{"note":"patient stable"}"#);

    // Same payload on a GET: the forwarder must not attach it.
    let response = forwarder
        .forward(&Method::GET, "/api/notes", None, &HeaderMap::new(), payload)
        .await;
    assert_eq!(body_string(response).await, "");
}

#[tokio::test]
async fn only_allow_listed_headers_reach_the_backend() {
    let app = Router::new().route(
        "/echo",
        get(|headers: HeaderMap| async move {
            Json(json!({
                "authorization": headers.get(header::AUTHORIZATION).map(|v| v.to_str().unwrap().to_owned()),
                "x_internal": headers.get("x-internal-secret").map(|v| v.to_str().unwrap().to_owned()),
            }))
        }),
    );
    let addr = spawn_backend(app).await;
    let forwarder = forwarder_to(addr, "/ui", "");

    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, "Bearer tok".parse().unwrap());
    headers.insert("x-internal-secret", "should-be-dropped".parse().unwrap());

    let response = forwarder
        .forward(&Method::GET, "/ui/echo", None, &headers, Bytes::new())
        .await;

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["authorization"], "Bearer tok");
    assert_eq!(body["x_internal"], serde_json::Value::Null);
}

#[tokio::test]
async fn backend_redirect_passes_through_unfollowed() {
    let app = Router::new().route(
        "/old",
        get(|| async {
            (
                StatusCode::FOUND,
                [(header::LOCATION, "/ui/patients")],
                "",
            )
                .into_response()
        }),
    );
    let addr = spawn_backend(app).await;
    let forwarder = forwarder_to(addr, "/ui", "");

    let response = forwarder
        .forward(&Method::GET, "/ui/old", None, &HeaderMap::new(), Bytes::new())
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/ui/patients");
}

#[tokio::test]
async fn unreachable_backend_yields_502_naming_the_target() {
    // Bind then immediately drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let forwarder = forwarder_to(addr, "/api", "/api");
    let response = forwarder
        .forward(
            &Method::GET,
            "/api/patients",
            None,
            &HeaderMap::new(),
            Bytes::new(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_string(response).await;
    assert!(body.contains("cannot reach"), "body was: {body}");
    assert!(body.contains(&format!("http://{addr}/api/patients")), "body was: {body}");
}
