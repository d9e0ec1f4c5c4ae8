//! Registry of connected browsers and the per-connection WebSocket lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const BROWSER_TIMEOUT: Duration = Duration::from_secs(90);

/// Unique identifier for one connected browser tab.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BrowserId(pub String);

impl Default for BrowserId {
    fn default() -> Self {
        Self(format!("browser_{}", Uuid::now_v7()))
    }
}

impl BrowserId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for BrowserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One connected browser: a send queue plus liveness bookkeeping.
pub struct Browser {
    pub id: BrowserId,
    pub tx: mpsc::Sender<String>,
    pub connected: AtomicBool,
    pub last_pong: AtomicU64,
}

impl Browser {
    fn new(id: BrowserId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < BROWSER_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected browsers. Every pushed event goes to all of
/// them: the server mirrors one shared session, so there is no routing.
pub struct BrowserRegistry {
    browsers: DashMap<BrowserId, Arc<Browser>>,
    max_send_queue: usize,
}

impl BrowserRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            browsers: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new browser and return its ID + message receiver.
    pub fn register(&self) -> (BrowserId, mpsc::Receiver<String>) {
        let id = BrowserId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let browser = Arc::new(Browser::new(id.clone(), tx));
        self.browsers.insert(id.clone(), browser);
        (id, rx)
    }

    pub fn unregister(&self, id: &BrowserId) {
        if let Some((_, browser)) = self.browsers.remove(id) {
            browser.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Send a message to a specific browser. Drops the message if its queue
    /// is full; a slow tab must not stall the rest.
    pub fn send_to(&self, id: &BrowserId, message: String) -> bool {
        if let Some(browser) = self.browsers.get(id) {
            match browser.tx.try_send(message) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    tracing::warn!(
                        browser_id = %id,
                        msg_len = msg.len(),
                        "Send queue full, dropping message"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        } else {
            false
        }
    }

    /// Broadcast a message to every connected browser.
    pub fn broadcast_all(&self, message: &str) {
        for entry in self.browsers.iter() {
            let browser = entry.value();
            if browser.is_connected() {
                let _ = browser.tx.try_send(message.to_string());
            }
        }
    }

    pub fn count(&self) -> usize {
        self.browsers.len()
    }

    /// Remove browsers that have not answered pings within the timeout.
    pub fn cleanup_dead(&self) -> usize {
        let dead: Vec<BrowserId> = self
            .browsers
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.value().id.clone())
            .collect();

        let removed = dead.len();
        for id in dead {
            self.unregister(&id);
            tracing::info!(browser_id = %id, "Cleaned up dead browser connection");
        }
        removed
    }

    fn get(&self, id: &BrowserId) -> Option<Arc<Browser>> {
        self.browsers.get(id).map(|entry| Arc::clone(entry.value()))
    }
}

/// Run one WebSocket connection: writer forwards queued messages plus
/// heartbeat pings, reader hands inbound text to the command processor.
pub async fn handle_ws_connection(
    socket: WebSocket,
    browser_id: BrowserId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<BrowserRegistry>,
    on_message: mpsc::Sender<(BrowserId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = browser_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(browser_id = %writer_id, "Sent ping");
                }
            }
        }

        if let Some(browser) = writer_registry.get(&writer_id) {
            browser.connected.store(false, Ordering::Relaxed);
        }
    });

    let reader_id = browser_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_message.send((reader_id.clone(), text.to_string())).await;
                }
                WsMessage::Pong(_) => {
                    if let Some(browser) = reader_registry.get(&reader_id) {
                        browser.record_pong();
                    }
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pongs automatically
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.unregister(&browser_id);
    tracing::info!(browser_id = %browser_id, "Browser disconnected");
}

/// Background task that periodically drops dead connections.
pub fn start_cleanup_task(
    registry: Arc<BrowserRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead();
            if removed > 0 {
                tracing::info!(removed = removed, "Dead browser cleanup");
            }
        }
    })
}
