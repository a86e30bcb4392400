//! Shared vocabulary for the shopfloor real-time layer.
//!
//! This crate holds the types that both halves of the system speak:
//!
//! - [`types`] — id and timestamp aliases.
//! - [`resource`] — the composite [`ResourceKey`](resource::ResourceKey)
//!   identifying a lockable entity.
//! - [`session`] — connection/identity association and lock records.
//! - [`protocol`] — the JSON wire protocol ([`ClientMessage`](protocol::ClientMessage)
//!   / [`ServerMessage`](protocol::ServerMessage)).
//!
//! It lives at the bottom of the dependency graph (no internal deps) so
//! the server, the client library, and any future tooling all reference
//! the same message shapes.

pub mod protocol;
pub mod resource;
pub mod session;
pub mod types;

pub use protocol::{ChangeAction, ClientMessage, LockEntry, ServerMessage};
pub use resource::ResourceKey;
pub use session::{EditLock, Session};
