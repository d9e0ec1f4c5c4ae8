//! WebSocket command handlers.

use std::sync::Arc;

use flingoos_core::errors::ClientError;

use crate::rpc::{self, RpcResponse};
use crate::session::{SessionCoordinator, SessionError};

/// Shared state available to all command handlers.
pub struct HandlerState {
    pub coordinator: Arc<SessionCoordinator>,
}

impl HandlerState {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }
}

/// Dispatch a WebSocket command to the appropriate handler.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        "session.start" => session_start(state, id).await,
        "session.stop" => session_stop(state, id).await,
        "session.status" => session_status(state, id).await,
        "system.ping" | "health" => health(id),
        _ => RpcResponse::method_not_found(id, method),
    }
}

async fn session_start(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    match state.coordinator.start().await {
        Ok(session_id) => RpcResponse::success(
            id,
            serde_json::json!({
                "session_id": session_id,
                "message": "Session started successfully",
            }),
        ),
        Err(e) => session_error_response(id, e),
    }
}

async fn session_stop(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    match state.coordinator.stop(None).await {
        Ok(session_id) => RpcResponse::success(
            id,
            serde_json::json!({
                "session_id": session_id,
                "message": "Session stopped, processing workflow...",
            }),
        ),
        Err(e) => session_error_response(id, e),
    }
}

async fn session_status(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let snapshot = state.coordinator.status().await;
    match serde_json::to_value(&snapshot) {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => RpcResponse::error(id, rpc::INTERNAL_ERROR, e.to_string()),
    }
}

fn health(id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(id, serde_json::json!({"status": "healthy"}))
}

fn session_error_response(id: Option<serde_json::Value>, err: SessionError) -> RpcResponse {
    let code = match &err {
        SessionError::AlreadyActive
        | SessionError::NotActive
        | SessionError::WrongSession(_) => rpc::INVALID_REQUEST,
        SessionError::Client(ClientError::Network(_))
        | SessionError::Client(ClientError::Upstream { .. }) => rpc::UPSTREAM_ERROR,
    };
    RpcResponse::error(id, code, err.to_string())
}
