//! Connection/identity presence bookkeeping.

use std::collections::HashMap;

use shopfloor_core::session::Session;
use shopfloor_core::types::{ConnectionId, DbId};

/// Maps live connection ids to registered user identities.
///
/// Owned exclusively by the coordinator task and mutated only from its
/// sequential command loop; no interior locking is needed.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a connection with an identity.
    ///
    /// Idempotent; a repeat registration for the same connection simply
    /// overwrites the prior identity.
    pub fn register(&mut self, connection_id: ConnectionId, user_id: DbId, username: String) {
        let session = Session {
            connection_id: connection_id.clone(),
            user_id,
            username,
        };
        self.sessions.insert(connection_id, session);
    }

    /// Remove the association for a closed connection.
    pub fn unregister(&mut self, connection_id: &str) -> Option<Session> {
        self.sessions.remove(connection_id)
    }

    /// Look up the identity bound to a connection, if any.
    pub fn lookup(&self, connection_id: &str) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    /// All connection ids registered for a given user.
    ///
    /// A user with several browser tabs open has several sessions.
    pub fn connections_for_user(&self, user_id: DbId) -> Vec<ConnectionId> {
        self.sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.connection_id.clone())
            .collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
