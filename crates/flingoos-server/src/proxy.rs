//! REST surface for the browser's fetch path. Thin relays to the coordinator;
//! every error becomes a user-visible JSON body, never a process failure.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use flingoos_core::errors::ClientError;
use flingoos_core::ids::SessionId;

use crate::server::AppState;
use crate::session::SessionError;

/// POST /api/session/start
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.handler_state.coordinator.start().await {
        Ok(session_id) => ok_json(serde_json::json!({
            "success": true,
            "session_id": session_id,
            "message": "Session started successfully",
        })),
        Err(e) => error_json(e),
    }
}

/// POST /api/session/{id}/stop
pub async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let session_id = SessionId::from_raw(id);
    match state.handler_state.coordinator.stop(Some(&session_id)).await {
        Ok(session_id) => ok_json(serde_json::json!({
            "success": true,
            "session_id": session_id,
            "message": "Session stopped, processing workflow...",
        })),
        Err(e) => error_json(e),
    }
}

/// GET /api/session/status
pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.handler_state.coordinator.status().await;
    let mut body = serde_json::to_value(&snapshot).unwrap_or_default();
    if let Some(map) = body.as_object_mut() {
        map.insert("success".into(), serde_json::json!(true));
    }
    ok_json(body)
}

/// GET /api/session/{id}/workflow
pub async fn session_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let session_id = SessionId::from_raw(id);
    match state.handler_state.coordinator.workflow(&session_id).await {
        Ok(workflow) => ok_json(serde_json::json!({
            "success": true,
            "workflow": workflow,
        })),
        Err(e) => error_json(e),
    }
}

fn ok_json(body: serde_json::Value) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(body))
}

/// Map a session error to an HTTP status: local rejections are the caller's
/// fault, upstream and transport failures are a bad gateway.
fn error_json(err: SessionError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        SessionError::AlreadyActive
        | SessionError::NotActive
        | SessionError::WrongSession(_) => StatusCode::BAD_REQUEST,
        SessionError::Client(ClientError::Network(_))
        | SessionError::Client(ClientError::Upstream { .. }) => StatusCode::BAD_GATEWAY,
    };
    tracing::warn!(error = %err, status = status.as_u16(), "API request failed");
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": err.to_string(),
        })),
    )
}
