use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use flingoos_core::events::UiEvent;

use crate::assets;
use crate::bridge;
use crate::client::{self, BrowserId, BrowserRegistry};
use crate::handlers::HandlerState;
use crate::proxy;
use crate::rpc::{RpcRequest, RpcResponse};
use crate::session::SessionCoordinator;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8844,
            max_send_queue: 256,
            cleanup_interval_secs: 60,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub registry: Arc<BrowserRegistry>,
    pub message_tx: mpsc::Sender<(BrowserId, String)>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/session/start", post(proxy::start_session))
        .route("/api/session/{id}/stop", post(proxy::stop_session))
        .route("/api/session/status", get(proxy::session_status))
        .route("/api/session/{id}/workflow", get(proxy::session_workflow))
        .merge(assets::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle that keeps the background
/// tasks alive; port 0 binds an ephemeral port.
pub async fn start(
    config: ServerConfig,
    coordinator: Arc<SessionCoordinator>,
    event_tx: broadcast::Sender<UiEvent>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(BrowserRegistry::new(config.max_send_queue));

    let bridge_handle = bridge::create_bridge(Arc::clone(&registry), event_tx.subscribe());

    let _cleanup = client::start_cleanup_task(
        Arc::clone(&registry),
        Duration::from_secs(config.cleanup_interval_secs),
    );

    let (msg_tx, msg_rx) = mpsc::channel::<(BrowserId, String)>(1024);

    let handler_state = Arc::new(HandlerState::new(coordinator));

    let app_state = AppState {
        handler_state: Arc::clone(&handler_state),
        registry: Arc::clone(&registry),
        message_tx: msg_tx,
    };

    let rpc_handle = tokio::spawn(process_commands(msg_rx, handler_state, registry));

    let router = build_router(app_state);
    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Flingoos Web UI started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _bridge: bridge_handle,
        _rpc: rpc_handle,
        _cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _bridge: tokio::task::JoinHandle<()>,
    _rpc: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new browser connection: greet it, then run the socket lifecycle.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (browser_id, rx) = state.registry.register();
    tracing::info!(browser_id = %browser_id, "Browser connected");

    let greeting = UiEvent::Connected {
        message: "Connected to Flingoos Web UI".into(),
    };
    if let Some(json) = bridge::serialize_event(&greeting) {
        state.registry.send_to(&browser_id, json);
    }

    client::handle_ws_connection(socket, browser_id, rx, state.registry, state.message_tx).await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "connected_browsers": state.registry.count(),
    }))
}

/// Process inbound WebSocket commands from browsers.
async fn process_commands(
    mut rx: mpsc::Receiver<(BrowserId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<BrowserRegistry>,
) {
    while let Some((browser_id, raw_message)) = rx.recv().await {
        let request: RpcRequest = match serde_json::from_str(&raw_message) {
            Ok(req) => req,
            Err(_) => {
                let resp = RpcResponse::parse_error();
                if let Ok(json) = serde_json::to_string(&resp) {
                    registry.send_to(&browser_id, json);
                }
                continue;
            }
        };

        let response = crate::handlers::dispatch(&state, &request.method, request.id).await;

        if let Ok(json) = serde_json::to_string(&response) {
            registry.send_to(&browser_id, json);
        }
    }
}
