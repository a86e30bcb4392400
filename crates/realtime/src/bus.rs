//! In-process entity-change event bus.
//!
//! The persistence layer publishes a [`ChangeEvent`] here after every
//! committed create/update/delete; the transport host subscribes and
//! fans each event out to connected clients. Backed by a
//! `tokio::sync::broadcast` channel and designed to be shared via
//! `Arc<EventBus>`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use shopfloor_core::protocol::{ChangeAction, ServerMessage};
use shopfloor_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// ChangeEvent
// ---------------------------------------------------------------------------

/// A committed entity mutation, ready for client fan-out.
///
/// Ephemeral: never persisted and never replayed to clients that were
/// disconnected when it was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// An inventory record was created, updated, or deleted.
    Inventory {
        action: ChangeAction,
        item: serde_json::Value,
        timestamp: Timestamp,
    },

    /// A job was created, updated, or deleted.
    Job {
        action: ChangeAction,
        job: serde_json::Value,
        timestamp: Timestamp,
    },

    /// A line item was added to, updated on, or removed from a job.
    JobItem {
        job_id: DbId,
        action: ChangeAction,
        item: serde_json::Value,
        timestamp: Timestamp,
    },
}

impl ChangeEvent {
    /// An inventory change, stamped with the current time.
    pub fn inventory(action: ChangeAction, item: serde_json::Value) -> Self {
        Self::Inventory {
            action,
            item,
            timestamp: chrono::Utc::now(),
        }
    }

    /// A job change, stamped with the current time.
    pub fn job(action: ChangeAction, job: serde_json::Value) -> Self {
        Self::Job {
            action,
            job,
            timestamp: chrono::Utc::now(),
        }
    }

    /// A job line-item change, stamped with the current time.
    pub fn job_item(job_id: DbId, action: ChangeAction, item: serde_json::Value) -> Self {
        Self::JobItem {
            job_id,
            action,
            item,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Convert into the wire message broadcast to clients.
    pub fn into_message(self) -> ServerMessage {
        match self {
            ChangeEvent::Inventory {
                action,
                item,
                timestamp,
            } => ServerMessage::InventoryUpdate {
                action,
                item,
                timestamp,
            },
            ChangeEvent::Job {
                action,
                job,
                timestamp,
            } => ServerMessage::JobUpdate {
                action,
                job,
                timestamp,
            },
            ChangeEvent::JobItem {
                job_id,
                action,
                item,
                timestamp,
            } => ServerMessage::JobItemUpdate {
                job_id,
                action,
                item,
                timestamp,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`ChangeEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With zero subscribers the event is silently dropped; delivery is
    /// best-effort by design.
    pub fn publish(&self, event: ChangeEvent) {
        // Ignore the SendError -- it only means there are no receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
