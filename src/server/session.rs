//! Session and event endpoints - thin wrappers over the recorder

use super::error::ApiError;
use super::extract::{ApiJson, ApiPath};
use super::state::AppState;
use crate::store::{EventRecord, SessionRecord};
use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

/// `POST /sessions/`
pub async fn create_session(
    State(state): State<AppState>,
    ApiJson(session): ApiJson<SessionRecord>,
) -> Result<(StatusCode, Json<SessionRecord>), ApiError> {
    let created = state.recorder()?.create_session(session).await?;
    tracing::info!(session_id = %created.session_id, user_id = %created.user_id, "Session created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /sessions/{session_id}`
pub async fn get_session(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<Json<SessionRecord>, ApiError> {
    state
        .recorder()?
        .get_session(session_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("session {}", session_id)))
}

/// `POST /events/`
pub async fn create_event(
    State(state): State<AppState>,
    ApiJson(event): ApiJson<EventRecord>,
) -> Result<(StatusCode, Json<EventRecord>), ApiError> {
    let created = state.recorder()?.create_event(event).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /sessions/{session_id}/events`, oldest first. Empty when none.
pub async fn list_events(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    let events = state.recorder()?.events_for_session(session_id).await?;
    Ok(Json(events))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store = if state.store_configured() {
        "configured"
    } else {
        "missing"
    };
    Json(json!({
        "status": "ok",
        "connections": state.hub.connection_count().await,
        "store": store,
    }))
}

/// `GET /websocket_test` - a minimal browser client for manual testing
pub async fn websocket_test_page() -> Html<&'static str> {
    Html(include_str!("../../assets/websocket_client.html"))
}
