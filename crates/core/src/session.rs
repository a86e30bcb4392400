//! Presence and lock records.

use serde::{Deserialize, Serialize};

use crate::resource::ResourceKey;
use crate::types::{ConnectionId, DbId};

/// The live association between a connection and a user identity.
///
/// Created by a successful `register` handshake and destroyed when the
/// connection closes. Neither survives a reconnect; a reconnecting client
/// must register again.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: DbId,
    pub username: String,
}

/// An advisory exclusive edit lock on a single resource.
///
/// At most one `EditLock` exists per [`ResourceKey`] at any time. The
/// holder's `connection_id` always references a live connection: when
/// that connection closes, the lock is removed in the same step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditLock {
    pub resource: ResourceKey,
    pub user_id: DbId,
    pub username: String,
    pub connection_id: ConnectionId,
}
