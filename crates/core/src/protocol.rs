//! Real-time wire protocol.
//!
//! Messages are JSON text frames, internally tagged with a `"type"`
//! discriminator so clients can route by type string. Payload fields are
//! camelCase to match the browser frontend's message shapes.

use serde::{Deserialize, Serialize};

use crate::resource::ResourceKey;
use crate::session::EditLock;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Messages a client sends to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Bind a user identity to this connection. The server replies with
    /// a targeted `edit-locks-sync` snapshot.
    #[serde(rename = "register", rename_all = "camelCase")]
    Register { user_id: DbId, username: String },

    /// Request an exclusive edit lock on one resource. Identity is
    /// carried with the request, independently of registration.
    #[serde(rename = "request-edit-lock", rename_all = "camelCase")]
    RequestEditLock {
        item_id: String,
        item_type: String,
        user_id: DbId,
        username: String,
    },

    /// Release a held edit lock. Releasing a lock this connection does
    /// not hold is a no-op.
    #[serde(rename = "release-edit-lock", rename_all = "camelCase")]
    ReleaseEditLock { item_id: String, item_type: String },
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// One lock in an `edit-locks-sync` snapshot.
///
/// The holder's connection id is server-internal and never crosses the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub item_id: String,
    pub item_type: String,
    pub user_id: DbId,
    pub username: String,
}

impl From<&EditLock> for LockEntry {
    fn from(lock: &EditLock) -> Self {
        Self {
            item_id: lock.resource.id.clone(),
            item_type: lock.resource.kind.clone(),
            user_id: lock.user_id,
            username: lock.username.clone(),
        }
    }
}

/// Entity-change action carried by update broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
    Added,
    Removed,
}

/// Messages the server sends to clients.
///
/// `edit-locks-sync`, `edit-lock-granted`, and `edit-lock-denied` are
/// targeted at a single connection; everything else is broadcast to all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full lock table snapshot, sent once to a freshly registered
    /// connection so its local view matches server state.
    #[serde(rename = "edit-locks-sync", rename_all = "camelCase")]
    EditLocksSync { locks: Vec<LockEntry> },

    /// The requester now holds the lock.
    #[serde(rename = "edit-lock-granted", rename_all = "camelCase")]
    EditLockGranted { item_id: String, item_type: String },

    /// The lock is held by someone else; `message` is suitable for
    /// showing to the user as-is.
    #[serde(rename = "edit-lock-denied", rename_all = "camelCase")]
    EditLockDenied {
        item_id: String,
        item_type: String,
        locked_by: String,
        message: String,
    },

    /// Broadcast: a lock was acquired somewhere.
    #[serde(rename = "edit-lock-acquired", rename_all = "camelCase")]
    EditLockAcquired {
        item_id: String,
        item_type: String,
        user_id: DbId,
        username: String,
    },

    /// Broadcast: a lock was released (explicitly or by disconnect).
    #[serde(rename = "edit-lock-released", rename_all = "camelCase")]
    EditLockReleased { item_id: String, item_type: String },

    /// Broadcast: an inventory record changed.
    #[serde(rename = "inventory-update", rename_all = "camelCase")]
    InventoryUpdate {
        action: ChangeAction,
        item: serde_json::Value,
        timestamp: Timestamp,
    },

    /// Broadcast: a job changed.
    #[serde(rename = "job-update", rename_all = "camelCase")]
    JobUpdate {
        action: ChangeAction,
        job: serde_json::Value,
        timestamp: Timestamp,
    },

    /// Broadcast: a line item on a job changed.
    #[serde(rename = "job-item-update", rename_all = "camelCase")]
    JobItemUpdate {
        job_id: DbId,
        action: ChangeAction,
        item: serde_json::Value,
        timestamp: Timestamp,
    },
}

impl ServerMessage {
    /// The wire-level event name (the `"type"` tag).
    ///
    /// Client-side subscription dispatch is keyed on these strings.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::EditLocksSync { .. } => "edit-locks-sync",
            ServerMessage::EditLockGranted { .. } => "edit-lock-granted",
            ServerMessage::EditLockDenied { .. } => "edit-lock-denied",
            ServerMessage::EditLockAcquired { .. } => "edit-lock-acquired",
            ServerMessage::EditLockReleased { .. } => "edit-lock-released",
            ServerMessage::InventoryUpdate { .. } => "inventory-update",
            ServerMessage::JobUpdate { .. } => "job-update",
            ServerMessage::JobItemUpdate { .. } => "job-item-update",
        }
    }

    /// The resource this lock message refers to, if it is a lock message.
    pub fn lock_resource(&self) -> Option<ResourceKey> {
        match self {
            ServerMessage::EditLockGranted {
                item_id, item_type, ..
            }
            | ServerMessage::EditLockDenied {
                item_id, item_type, ..
            }
            | ServerMessage::EditLockAcquired {
                item_id, item_type, ..
            }
            | ServerMessage::EditLockReleased { item_id, item_type } => {
                Some(ResourceKey::new(item_type.clone(), item_id.clone()))
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_register_wire_shape() {
        let msg = ClientMessage::Register {
            user_id: 7,
            username: "alice".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "register");
        assert_eq!(json["userId"], 7);
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn request_lock_fields_are_camel_case() {
        let msg = ClientMessage::RequestEditLock {
            item_id: "42".into(),
            item_type: "inventory".into(),
            user_id: 7,
            username: "alice".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "request-edit-lock");
        assert_eq!(json["itemId"], "42");
        assert_eq!(json["itemType"], "inventory");
    }

    #[test]
    fn denied_carries_holder_name() {
        let msg = ServerMessage::EditLockDenied {
            item_id: "42".into(),
            item_type: "inventory".into(),
            locked_by: "bob".into(),
            message: "This inventory is currently being edited by bob".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "edit-lock-denied");
        assert_eq!(json["lockedBy"], "bob");
    }

    #[test]
    fn change_action_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ChangeAction::Created).unwrap(),
            "created"
        );
        assert_eq!(
            serde_json::to_value(ChangeAction::Removed).unwrap(),
            "removed"
        );
    }

    #[test]
    fn inbound_frame_parses_by_type_tag() {
        let frame = r#"{"type":"release-edit-lock","itemId":"7","itemType":"job"}"#;
        let msg: ClientMessage = serde_json::from_str(frame).unwrap();

        assert_eq!(
            msg,
            ClientMessage::ReleaseEditLock {
                item_id: "7".into(),
                item_type: "job".into(),
            }
        );
    }

    #[test]
    fn lock_resource_extraction() {
        let msg = ServerMessage::EditLockReleased {
            item_id: "7".into(),
            item_type: "job".into(),
        };
        assert_eq!(msg.lock_resource(), Some(ResourceKey::new("job", "7")));

        let msg = ServerMessage::EditLocksSync { locks: vec![] };
        assert_eq!(msg.lock_resource(), None);
    }
}
