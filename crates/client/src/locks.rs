//! Local mirror of the server's lock table.

use std::collections::HashMap;
use std::sync::Mutex;

use shopfloor_core::protocol::{LockEntry, ServerMessage};
use shopfloor_core::resource::ResourceKey;
use shopfloor_core::types::DbId;

/// Client-side view of who is editing what.
///
/// Kept in sync by applying `edit-locks-sync`, `edit-lock-acquired`, and
/// `edit-lock-released` messages as they arrive. All reads are pure and
/// reflect the most recently applied message.
#[derive(Default)]
pub struct LockView {
    locks: Mutex<HashMap<ResourceKey, LockEntry>>,
}

impl LockView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one server message into the view. Non-lock messages are
    /// ignored.
    pub fn apply(&self, message: &ServerMessage) {
        match message {
            ServerMessage::EditLocksSync { locks } => {
                let mut map = self.locks.lock().expect("lock view poisoned");
                map.clear();
                for entry in locks {
                    let key = ResourceKey::new(entry.item_type.clone(), entry.item_id.clone());
                    map.insert(key, entry.clone());
                }
            }
            ServerMessage::EditLockAcquired {
                item_id,
                item_type,
                user_id,
                username,
            } => {
                let key = ResourceKey::new(item_type.clone(), item_id.clone());
                self.locks.lock().expect("lock view poisoned").insert(
                    key,
                    LockEntry {
                        item_id: item_id.clone(),
                        item_type: item_type.clone(),
                        user_id: *user_id,
                        username: username.clone(),
                    },
                );
            }
            ServerMessage::EditLockReleased { item_id, item_type } => {
                let key = ResourceKey::new(item_type.clone(), item_id.clone());
                self.locks.lock().expect("lock view poisoned").remove(&key);
            }
            _ => {}
        }
    }

    /// Forget everything. Called when the connection drops: server-side
    /// locks tied to it are gone, and a fresh sync arrives on reconnect.
    pub fn clear(&self) {
        self.locks.lock().expect("lock view poisoned").clear();
    }

    /// Whether the resource is locked by anyone.
    pub fn is_locked(&self, resource: &ResourceKey) -> bool {
        self.locks
            .lock()
            .expect("lock view poisoned")
            .contains_key(resource)
    }

    /// The current holder of a resource, if locked.
    pub fn holder(&self, resource: &ResourceKey) -> Option<LockEntry> {
        self.locks
            .lock()
            .expect("lock view poisoned")
            .get(resource)
            .cloned()
    }

    /// Whether the given user holds the lock on a resource.
    pub fn is_held_by(&self, resource: &ResourceKey, user_id: DbId) -> bool {
        self.holder(resource).is_some_and(|l| l.user_id == user_id)
    }

    /// Number of locks currently mirrored.
    pub fn len(&self) -> usize {
        self.locks.lock().expect("lock view poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
