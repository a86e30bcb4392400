//! Composite keys for lockable resources.
//!
//! A [`ResourceKey`] identifies one logical editable entity (an inventory
//! record, a job, ...). Keys are a proper `(kind, id)` pair rather than a
//! concatenated `"kind-id"` string, so identifiers containing the
//! separator character cannot collide or mis-parse.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Known resource kinds for edit locking.
///
/// The set is open: new kinds require no coordinator changes, only a new
/// constant here.
pub mod resource_kinds {
    pub const INVENTORY: &str = "inventory";
    pub const JOB: &str = "job";
    pub const JOB_ITEM: &str = "job-item";
}

/// Identifies a logical editable entity subject to locking.
///
/// Equality and hashing are structural over both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource kind discriminator, e.g. `"inventory"` or `"job"`.
    pub kind: String,
    /// Entity identifier within the kind. Kept as a string because
    /// upstream ids cross the wire as JSON strings or numbers.
    pub id: String,
}

impl ResourceKey {
    /// Build a key from a kind and an id.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}
