use std::sync::Arc;

use shopfloor_realtime::{CoordinatorHandle, EventBus};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Handle for submitting commands to the lock coordinator.
    pub coordinator: CoordinatorHandle,
    /// Entity-change bus. The persistence layer's CRUD handlers publish
    /// here after each committed mutation; the update forwarder fans the
    /// events out to connected clients.
    pub event_bus: Arc<EventBus>,
}
