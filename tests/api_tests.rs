//! HTTP endpoint tests driven through the router without a socket

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use switchboard::hub::{ClientId, Hub, SendPolicy};
use switchboard::recorder::Recorder;
use switchboard::server::{build_router, AppState};
use switchboard::store::{MemoryStore, PersistenceStore};
use tower::ServiceExt;

fn recording_state() -> AppState {
    let store: Arc<dyn PersistenceStore> = Arc::new(MemoryStore::new());
    let recorder = Recorder::new(store);
    let hub = Hub::new(SendPolicy::default()).with_recorder(recorder.clone());
    AppState::new(Arc::new(hub), Some(recorder), 64 * 1024)
}

fn bare_state() -> AppState {
    AppState::new(Arc::new(Hub::new(SendPolicy::default())), None, 64 * 1024)
}

async fn send(app: &Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_create_and_fetch_session() -> anyhow::Result<()> {
    let app = build_router(recording_state());

    let (status, created) = send(&app, post_json("/sessions/", json!({ "user_id": "alice" }))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["user_id"], "alice");
    assert!(created["end_time"].is_null());

    let id = created["session_id"].as_str().unwrap().to_string();
    let (status, fetched) = send(&app, get(&format!("/sessions/{}", id))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    Ok(())
}

#[tokio::test]
async fn test_session_with_client_supplied_id() -> anyhow::Result<()> {
    let app = build_router(recording_state());
    let id = uuid::Uuid::new_v4();

    let (status, created) = send(
        &app,
        post_json("/sessions", json!({ "session_id": id, "user_id": "bob" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["session_id"], id.to_string());

    Ok(())
}

#[tokio::test]
async fn test_missing_session_is_not_found() -> anyhow::Result<()> {
    let app = build_router(recording_state());

    let (status, body) = send(&app, get(&format!("/sessions/{}", uuid::Uuid::new_v4()))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    Ok(())
}

#[tokio::test]
async fn test_malformed_session_id_is_rejected() -> anyhow::Result<()> {
    let app = build_router(recording_state());

    let (status, body) = send(&app, get("/sessions/not-a-uuid")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = send(&app, get("/sessions/not-a-uuid/events")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_malformed_bodies_use_error_shape() -> anyhow::Result<()> {
    let app = build_router(recording_state());

    // Missing the required user_id
    let (status, body) = send(&app, post_json("/sessions/", json!({ "summary": "x" }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let request = Request::builder()
        .method("POST")
        .uri("/events/")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].is_string());

    let (status, body) = send(&app, get("/ws/alice?session_id=nope")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_event_for_unknown_session_is_rejected() -> anyhow::Result<()> {
    let app = build_router(recording_state());

    let (status, body) = send(
        &app,
        post_json(
            "/events/",
            json!({ "session_id": uuid::Uuid::new_v4(), "event_type": "message" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "STORE_ERROR");

    Ok(())
}

#[tokio::test]
async fn test_events_listed_oldest_first() -> anyhow::Result<()> {
    let app = build_router(recording_state());

    let (_, session) = send(&app, post_json("/sessions/", json!({ "user_id": "carol" }))).await?;
    let session_id = session["session_id"].as_str().unwrap().to_string();

    // Posted out of order on purpose
    for (ts, kind) in [
        ("2024-01-01T00:00:02Z", "message"),
        ("2024-01-01T00:00:01Z", "join"),
        ("2024-01-01T00:00:03Z", "leave"),
    ] {
        let (status, created) = send(
            &app,
            post_json(
                "/events/",
                json!({
                    "session_id": session_id,
                    "timestamp": ts,
                    "event_type": kind,
                    "event_data": { "n": 1 },
                }),
            ),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created["event_id"].is_string());
    }

    let (status, events) = send(&app, get(&format!("/sessions/{}/events", session_id))).await?;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["join", "message", "leave"]);

    Ok(())
}

#[tokio::test]
async fn test_events_for_unknown_session_is_empty() -> anyhow::Result<()> {
    let app = build_router(recording_state());

    let (status, events) = send(
        &app,
        get(&format!("/sessions/{}/events", uuid::Uuid::new_v4())),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events, json!([]));

    Ok(())
}

#[tokio::test]
async fn test_store_endpoints_without_store() -> anyhow::Result<()> {
    let app = build_router(bare_state());

    let (status, body) = send(&app, post_json("/sessions/", json!({ "user_id": "dave" }))).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "STORE_MISCONFIGURED");

    let (status, _) = send(&app, get(&format!("/sessions/{}", uuid::Uuid::new_v4()))).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    Ok(())
}

#[tokio::test]
async fn test_health_reports_connections_and_store() -> anyhow::Result<()> {
    let state = recording_state();
    let _alice = state.hub.join(ClientId::parse("alice")?, None).await?;
    let app = build_router(state);

    let (status, body) = send(&app, get("/health")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["store"], "configured");

    let (_, body) = send(&build_router(bare_state()), get("/health")).await?;
    assert_eq!(body["store"], "missing");

    Ok(())
}

#[tokio::test]
async fn test_plain_get_on_socket_route_is_bad_request() -> anyhow::Result<()> {
    let app = build_router(bare_state());

    let (status, body) = send(&app, get("/ws/alice")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn test_live_identifier_is_conflict() -> anyhow::Result<()> {
    let state = bare_state();
    let _alice = state.hub.join(ClientId::parse("alice")?, None).await?;
    let app = build_router(state);

    let (status, body) = send(&app, get("/ws/alice")).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    Ok(())
}

#[tokio::test]
async fn test_test_page_is_served() -> anyhow::Result<()> {
    let app = build_router(bare_state());

    let response = app.clone().oneshot(get("/websocket_test")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert!(String::from_utf8_lossy(&bytes).contains("WebSocket"));

    Ok(())
}
