//! End-to-end tests driving `AppState` (wired with the in-memory store and
//! fake render/validate/status/queue collaborators) through the full axum
//! router, the same way a real client would.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use smg_auth::{ApiKeyEntry, ControlPlaneAuthConfig, ControlPlaneAuthState, Role};
use sse_bridge_core::RequestContext;
use sse_render_bridge::config::AppConfig;
use sse_render_bridge::routes;
use sse_render_bridge::state::AppState;
use tower::ServiceExt;

fn test_config(dev_mode_skip_auth: bool) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        store_url: "redis://127.0.0.1:6379".to_string(),
        store_max_connections: 4,
        heartbeat_interval_secs: 30,
        connection_timeout_secs: 300,
        cleanup_interval_secs: 60,
        event_buffer_size: 100,
        event_buffer_ttl_secs: 3600,
        channel_name: "sse_events_test".to_string(),
        sse_enabled: true,
        api_keys: vec![],
        api_key_hashes: vec![],
        dev_mode_skip_auth,
        dev_mode: true,
        allowed_origins: vec![],
        jwt_issuer: None,
        jwt_audience: None,
        jwks_uri: None,
        log_json: false,
    }
}

fn auth_state(dev_mode_skip_auth: bool, api_keys: Vec<ApiKeyEntry>) -> ControlPlaneAuthState {
    ControlPlaneAuthState::new(ControlPlaneAuthConfig {
        api_keys,
        jwt: None,
        dev_mode_skip_auth,
        allowed_origins: vec![],
    })
}

fn app_state(dev_mode_skip_auth: bool) -> AppState {
    AppState::with_fakes(test_config(dev_mode_skip_auth), auth_state(dev_mode_skip_auth, vec![]))
}

async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn healthz_is_reachable_without_credentials_denied() {
    let state = app_state(false);
    let app = routes::router(state);
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, body) = send(app, req).await;
    // Auth runs ahead of the handler for every route, /healthz included.
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "AUTHENTICATION_FAILED");
}

#[tokio::test]
async fn healthz_reports_ok_once_authenticated() {
    let state = app_state(true);
    let app = routes::router(state);
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_api_key_is_rejected() {
    let state = app_state(false);
    let app = routes::router(state);
    let req = Request::builder()
        .uri("/sse/stats")
        .header("x-api-key", "not-a-real-key")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_api_key_reaches_the_handler() {
    let key_hash = ApiKeyEntry::hash_of("a-real-key");
    let state = AppState::with_fakes(
        test_config(false),
        auth_state(false, vec![ApiKeyEntry { key_hash, principal: "svc-a".into(), role: Role::Client }]),
    );
    let app = routes::router(state);
    let req = Request::builder()
        .uri("/sse/stats")
        .header("x-api-key", "a-real-key")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_connections"], Value::from(0));
}

#[tokio::test]
async fn render_sync_then_status_round_trip() {
    let state = app_state(true);
    let connection_id = state.manager.open(RequestContext::default(), None, None).await.unwrap();
    let app = routes::router(state);

    let render_body = json!({
        "connection_id": connection_id.to_string(),
        "dsl_content": {"type": "screen", "elements": []},
    });
    let (status, body) = send(app.clone(), json_request("POST", "/sse/render", render_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));
    assert!(body["events_sent"].as_u64().unwrap() > 0);
    assert!(body["result"]["png_result"]["base64_data"].is_string());
}

#[tokio::test]
async fn validate_dsl_reports_missing_type_field() {
    let state = app_state(true);
    let connection_id = state.manager.open(RequestContext::default(), None, None).await.unwrap();
    let app = routes::router(state);

    let body = json!({
        "connection_id": connection_id.to_string(),
        "dsl_content": {"elements": []},
    });
    let (status, body) = send(app, json_request("POST", "/sse/validate", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));
    assert_eq!(body["result"]["valid"], Value::Bool(false));
}

#[tokio::test]
async fn tool_call_against_unknown_connection_is_404() {
    let state = app_state(true);
    let app = routes::router(state);
    let body = json!({
        "connection_id": sse_protocol::ConnectionId::new().to_string(),
        "dsl_content": {"type": "screen"},
    });
    let (status, _) = send(app, json_request("POST", "/sse/render", body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn async_render_completes_via_background_task_queue() {
    let state = app_state(true);
    let connection_id = state.manager.open(RequestContext::default(), None, None).await.unwrap();
    let tracker = state.tracker.clone();
    let app = routes::router(state);

    let render_body = json!({
        "connection_id": connection_id.to_string(),
        "dsl_content": {"type": "screen", "elements": []},
        "async_mode": true,
    });
    let (status, body) = send(app.clone(), json_request("POST", "/sse/render", render_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));
    let task_id = body["result"]["task_id"].as_str().unwrap().to_string();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let task = tracker.get(&task_id.parse().unwrap()).await.unwrap().unwrap();
        if task.get("status").and_then(Value::as_str) == Some("completed") {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("async render never completed: {task:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let status_body = json!({
        "connection_id": connection_id.to_string(),
        "task_id": task_id,
        "include_result": true,
    });
    let (status, body) = send(app, json_request("POST", "/sse/status", status_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["status"], Value::String("completed".to_string()));
}

#[tokio::test]
async fn broadcast_rejects_unknown_event_type() {
    let state = app_state(true);
    let app = routes::router(state);
    let body = json!({ "event_type": "not.a.real.event", "data": {} });
    let (status, _) = send(app, json_request("POST", "/sse/broadcast", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn broadcast_reaches_every_open_connection() {
    let state = app_state(true);
    state.manager.open(RequestContext::default(), None, None).await.unwrap();
    state.manager.open(RequestContext::default(), None, None).await.unwrap();
    let app = routes::router(state);

    let body = json!({ "event_type": "status.update", "data": {"message": "hi"} });
    let (status, body) = send(app, json_request("POST", "/sse/broadcast", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent_count"], Value::from(2));
}

#[tokio::test]
async fn connection_lifecycle_get_then_close_then_404() {
    let state = app_state(true);
    let connection_id = state.manager.open(RequestContext::default(), None, None).await.unwrap();
    let app = routes::router(state);

    let req = Request::builder().uri(format!("/sse/connections/{connection_id}")).body(Body::empty()).unwrap();
    let (status, body) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connected");

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/sse/connections/{connection_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::builder().uri(format!("/sse/connections/{connection_id}")).body(Body::empty()).unwrap();
    let (status, _) = send(app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rate_limiter_eventually_returns_429() {
    let state = app_state(true);
    let app = routes::router(state);

    let mut saw_429 = false;
    for _ in 0..40 {
        let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            saw_429 = true;
            break;
        }
    }
    assert!(saw_429, "rate limiter never tripped across 40 rapid requests");
}

#[tokio::test]
async fn connect_stream_opens_and_emits_connection_opened() {
    use futures::StreamExt;

    let state = app_state(true);
    let app = routes::router(state);

    let port = portpicker::pick_unused_port().expect("a free port");
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let server = tokio::spawn(async move {
        axum_server::bind(addr)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    // Give the listener a moment to come up before the client connects.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = reqwest::Client::new();
    let response = client.get(format!("http://{addr}/sse/connect")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert!(response.headers().contains_key("x-sse-connection-id"));

    let mut stream = response.bytes_stream();
    let first_chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("first SSE frame within timeout")
        .expect("stream yields at least one frame")
        .unwrap();
    let text = String::from_utf8(first_chunk.to_vec()).unwrap();
    assert!(text.contains("event: connection.opened"), "unexpected first frame: {text}");

    server.abort();
}
