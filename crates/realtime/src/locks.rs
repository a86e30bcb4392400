//! The exclusive edit-lock table.

use std::collections::HashMap;

use shopfloor_core::resource::ResourceKey;
use shopfloor_core::session::EditLock;
use shopfloor_core::types::{ConnectionId, DbId};

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    /// The resource was unlocked; a new lock was created.
    Granted,
    /// The requester already holds this lock (same connection or same
    /// user). No state changed.
    AlreadyHeld,
    /// Another user holds the lock; `holder` names them.
    Denied { holder: String },
}

/// Maps resource keys to their current lock holder.
///
/// At most one [`EditLock`] exists per key: the table is a map, not a
/// multimap. Owned by the coordinator task; all mutation is synchronous.
#[derive(Default)]
pub struct LockTable {
    locks: HashMap<ResourceKey, EditLock>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire an exclusive lock.
    ///
    /// Re-entrant for the same connection or the same user id (another
    /// tab of the same user does not contend with itself).
    pub fn acquire(
        &mut self,
        resource: ResourceKey,
        connection_id: ConnectionId,
        user_id: DbId,
        username: String,
    ) -> AcquireOutcome {
        match self.locks.get(&resource) {
            Some(existing) if existing.connection_id == connection_id => {
                AcquireOutcome::AlreadyHeld
            }
            Some(existing) if existing.user_id == user_id => AcquireOutcome::AlreadyHeld,
            Some(existing) => AcquireOutcome::Denied {
                holder: existing.username.clone(),
            },
            None => {
                self.locks.insert(
                    resource.clone(),
                    EditLock {
                        resource,
                        user_id,
                        username,
                        connection_id,
                    },
                );
                AcquireOutcome::Granted
            }
        }
    }

    /// Release a lock held by the given connection.
    ///
    /// Returns `true` if a lock was removed. Releasing an unlocked
    /// resource, or one held by a different connection, is a no-op:
    /// releases race with disconnect cleanup and must never error.
    pub fn release(&mut self, resource: &ResourceKey, connection_id: &str) -> bool {
        match self.locks.get(resource) {
            Some(lock) if lock.connection_id == connection_id => {
                self.locks.remove(resource);
                true
            }
            _ => false,
        }
    }

    /// Remove every lock held by a closed connection.
    ///
    /// Returns the removed locks so the caller can broadcast one release
    /// per lock. A single disconnect can release zero, one, or many.
    pub fn release_all_for(&mut self, connection_id: &str) -> Vec<EditLock> {
        let keys: Vec<ResourceKey> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.connection_id == connection_id)
            .map(|(key, _)| key.clone())
            .collect();

        keys.iter()
            .filter_map(|key| self.locks.remove(key))
            .collect()
    }

    /// Current holder of a resource, if locked.
    pub fn holder(&self, resource: &ResourceKey) -> Option<&EditLock> {
        self.locks.get(resource)
    }

    /// Whether the resource is currently locked.
    pub fn is_locked(&self, resource: &ResourceKey) -> bool {
        self.locks.contains_key(resource)
    }

    /// All current locks, for the register-time sync.
    pub fn snapshot(&self) -> Vec<EditLock> {
        self.locks.values().cloned().collect()
    }

    /// Number of held locks.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
