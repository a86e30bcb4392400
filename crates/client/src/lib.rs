//! Consumer-side library for the shopfloor real-time layer.
//!
//! [`RealtimeClient`] maintains a WebSocket connection to the server
//! (with registration, heartbeat replies, and exponential-backoff
//! reconnect) and exposes the pieces an edit UI needs:
//!
//! - [`SubscriptionManager`] — named-event handler registry with an
//!   explicit subscribe/unsubscribe lifecycle.
//! - [`LockView`] — local mirror of the server's lock table, kept in
//!   sync from lock broadcasts and the register-time snapshot.
//! - `acquire` / `release` — the lock-aware binding edit forms use to
//!   gate input, with request correlation and a fixed timeout.
//!
//! Handlers are not transport-aware: after a reconnect the server state
//! is fresh, locks are gone, and re-acquisition is the caller's
//! responsibility.

pub mod client;
pub mod locks;
pub mod reconnect;
pub mod requests;
pub mod subscriptions;

pub use client::{ClientConfig, RealtimeClient};
pub use locks::LockView;
pub use requests::LockRequestError;
pub use subscriptions::{Subscription, SubscriptionManager};
