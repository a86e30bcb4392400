//! Transport seam between the coordinator and its host.

use async_trait::async_trait;
use shopfloor_core::protocol::ServerMessage;

/// Outbound message delivery, implemented by the transport host.
///
/// The coordinator never talks to sockets directly; it emits protocol
/// messages through this trait. Delivery is best-effort: sending to a
/// closed or unknown connection must be a silent no-op, never an error,
/// so implementations return nothing.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver a message to every currently connected client.
    async fn broadcast(&self, message: ServerMessage);

    /// Deliver a message to one specific connection.
    async fn send_to(&self, connection_id: &str, message: ServerMessage);
}
