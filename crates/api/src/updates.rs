//! Entity-change fan-out.
//!
//! [`UpdateForwarder`] subscribes to the
//! [`EventBus`](shopfloor_realtime::EventBus) and broadcasts
//! each committed mutation to every connected WebSocket client, so UI
//! state stays consistent without polling.

use std::sync::Arc;

use tokio::sync::broadcast;

use shopfloor_realtime::{Broadcaster, ChangeEvent};

use crate::ws::WsManager;

/// Bridges the in-process event bus to connected WebSocket clients.
pub struct UpdateForwarder {
    ws_manager: Arc<WsManager>,
}

impl UpdateForwarder {
    /// Create a forwarder delivering through the given connection manager.
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the forwarding loop.
    ///
    /// Consumes events from `receiver` until the channel is closed (i.e.
    /// the [`EventBus`](shopfloor_realtime::EventBus) is dropped).
    /// Lagging only skips events; delivery is best-effort with no replay.
    pub async fn run(self, mut receiver: broadcast::Receiver<ChangeEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::debug!(event = ?event, "Forwarding change event");
                    self.ws_manager.broadcast(event.into_message()).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Update forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, update forwarder shutting down");
                    break;
                }
            }
        }
    }
}
