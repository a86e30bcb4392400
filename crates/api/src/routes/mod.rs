pub mod health;

use axum::routing::any;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws    WebSocket upgrade (register / edit locks / change broadcasts)
/// ```
///
/// CRUD routes for inventory, jobs, and customers live in the
/// persistence service, not here.
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/ws", any(ws::ws_handler))
}
