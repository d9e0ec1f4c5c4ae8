use std::sync::Arc;

use tokio::sync::broadcast;

use flingoos_core::events::UiEvent;

use crate::client::BrowserRegistry;

/// Subscribes to the UI event broadcast and forwards each event to every
/// connected browser.
pub struct EventBridge {
    registry: Arc<BrowserRegistry>,
}

impl EventBridge {
    pub fn new(registry: Arc<BrowserRegistry>) -> Self {
        Self { registry }
    }

    /// Start the bridge. Reads from the broadcast channel until it closes.
    pub fn start(&self, mut rx: broadcast::Receiver<UiEvent>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(json) = serialize_event(&event) {
                            registry.broadcast_all(&json);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create an event bridge wired to a broadcast channel.
pub fn create_bridge(
    registry: Arc<BrowserRegistry>,
    rx: broadcast::Receiver<UiEvent>,
) -> tokio::task::JoinHandle<()> {
    let bridge = EventBridge::new(registry);
    bridge.start(rx)
}

pub fn serialize_event(event: &UiEvent) -> Option<String> {
    serde_json::to_string(event).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flingoos_core::ids::SessionId;

    #[test]
    fn serialize_session_started() {
        let event = UiEvent::SessionStarted {
            session_id: SessionId::from_raw("sess_abc"),
        };
        let json = serialize_event(&event).unwrap();
        assert!(json.contains("\"type\":\"session_started\""));
        assert!(json.contains("sess_abc"));
    }

    #[tokio::test]
    async fn bridge_forwards_to_all_browsers() {
        let registry = Arc::new(BrowserRegistry::new(32));
        let (tx, rx) = broadcast::channel(100);

        let (_id1, mut rx1) = registry.register();
        let (_id2, mut rx2) = registry.register();

        let handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(UiEvent::UploadComplete { has_workflow: true }).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(rx1.try_recv().unwrap().contains("upload_complete"));
        assert!(rx2.try_recv().unwrap().contains("upload_complete"));

        handle.abort();
    }

    #[tokio::test]
    async fn bridge_exits_when_channel_closes() {
        let registry = Arc::new(BrowserRegistry::new(32));
        let (tx, rx) = broadcast::channel::<UiEvent>(16);

        let handle = create_bridge(registry, rx);
        drop(tx);

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("bridge task should exit")
            .unwrap();
    }
}
