//! Shopfloor real-time API server library.
//!
//! Exposes the building blocks (config, state, routes, WebSocket
//! infrastructure, update forwarding) so integration tests and the
//! binary entrypoint can both access them.

pub mod config;
pub mod router;
pub mod routes;
pub mod state;
pub mod updates;
pub mod ws;
