//! Server-side real-time coordination for shopfloor.
//!
//! This crate is transport-agnostic: it knows nothing about WebSockets.
//! The host supplies a [`Broadcaster`] implementation and feeds protocol
//! commands into the [`LockCoordinator`]; everything else is internal.
//!
//! - [`SessionRegistry`] — connection ↔ identity bookkeeping.
//! - [`LockTable`] — the exclusive edit-lock mapping.
//! - [`LockCoordinator`] — sequential command loop tying the two
//!   together and emitting protocol messages.
//! - [`EventBus`] — in-process fan-out of entity [`ChangeEvent`]s
//!   published by the persistence layer.

pub mod broadcaster;
pub mod bus;
pub mod coordinator;
pub mod locks;
pub mod registry;

pub use broadcaster::Broadcaster;
pub use bus::{ChangeEvent, EventBus};
pub use coordinator::{CoordinatorHandle, LockCoordinator};
pub use locks::{AcquireOutcome, LockTable};
pub use registry::SessionRegistry;
