use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use shopfloor_core::protocol::ClientMessage;
use shopfloor_core::resource::ResourceKey;
use shopfloor_realtime::CoordinatorHandle;

use crate::state::AppState;
use crate::ws::manager::WsManager;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// managed by two tasks (sender + receiver).
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, state.coordinator))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Dispatches inbound protocol messages to the lock coordinator.
///   4. Cleans up on disconnect, releasing any locks the connection held.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, coordinator: CoordinatorHandle) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Register and get the receiver for outbound messages.
    let mut rx = ws_manager.add(conn_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound messages.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(text)) => dispatch(&conn_id, &coordinator, text.as_str()),
            Ok(_msg) => {
                // Binary and Ping frames carry no protocol meaning.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: release locks, remove the connection, stop the sender.
    coordinator.connection_closed(conn_id.clone());
    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Parse one inbound text frame and forward it to the coordinator.
///
/// Malformed frames are logged and dropped; the protocol prefers
/// idempotent no-ops over strict errors.
fn dispatch(conn_id: &str, coordinator: &CoordinatorHandle, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, error = %e, "Dropping malformed frame");
            return;
        }
    };

    match message {
        ClientMessage::Register { user_id, username } => {
            coordinator.register(conn_id.to_string(), user_id, username);
        }
        ClientMessage::RequestEditLock {
            item_id,
            item_type,
            user_id,
            username,
        } => {
            coordinator.request_lock(
                ResourceKey::new(item_type, item_id),
                conn_id.to_string(),
                user_id,
                username,
            );
        }
        ClientMessage::ReleaseEditLock { item_id, item_type } => {
            coordinator.release_lock(ResourceKey::new(item_type, item_id), conn_id.to_string());
        }
    }
}
