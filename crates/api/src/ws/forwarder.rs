//! Relays game events from the bus to WebSocket clients.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;
use waifu_events::GameEvent;

use crate::ws::WsManager;

/// Serializes every [`GameEvent`] to JSON and delivers it to untagged
/// frontend connections plus the connections of the players involved.
pub struct EventForwarder {
    ws_manager: Arc<WsManager>,
}

impl EventForwarder {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run until the bus closes (every [`EventBus`](waifu_events::EventBus)
    /// handle dropped).
    pub async fn run(self, mut receiver: broadcast::Receiver<GameEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.forward(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event forwarder shutting down");
                    break;
                }
            }
        }
    }

    async fn forward(&self, event: &GameEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let participants = event.kind.participants();
                let sent = self
                    .ws_manager
                    .deliver(Message::Text(json.into()), &participants)
                    .await;
                tracing::debug!(event_type = event.event_type(), sent, "Forwarded game event");
            }
            Err(e) => {
                tracing::error!(error = %e, event_type = event.event_type(), "Failed to serialize game event");
            }
        }
    }
}
