//! Request/response correlation for lock acquisition.
//!
//! The wire protocol is pub/sub: a `request-edit-lock` is answered later
//! by a targeted `edit-lock-granted` or `edit-lock-denied` carrying the
//! same resource key. [`PendingRequests`] turns that into an awaitable
//! one-shot reply per key, instead of ad hoc listener add/remove pairs.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use shopfloor_core::resource::ResourceKey;

/// Terminal outcome of one lock request.
#[derive(Debug, Clone, PartialEq)]
pub enum LockReply {
    Granted,
    Denied { locked_by: String, message: String },
}

/// Why an `acquire` call failed.
#[derive(Debug, thiserror::Error)]
pub enum LockRequestError {
    /// The client has no live connection; nothing was sent.
    #[error("not connected")]
    NotConnected,

    /// Someone else holds the lock. `message` is user-facing.
    #[error("{message}")]
    Denied { locked_by: String, message: String },

    /// Neither a grant nor a denial arrived within the request window.
    #[error("lock request timed out")]
    Timeout,

    /// The connection dropped while the request was in flight.
    #[error("connection closed while awaiting lock reply")]
    ConnectionClosed,
}

/// In-flight lock requests, correlated by resource key.
///
/// At most one request per key is outstanding; registering a new one
/// replaces (and thereby cancels) any prior waiter for the same key.
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<ResourceKey, oneshot::Sender<LockReply>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the reply for `resource`.
    pub fn register(&self, resource: ResourceKey) -> oneshot::Receiver<LockReply> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .lock()
            .expect("pending requests poisoned")
            .insert(resource, tx);
        rx
    }

    /// Complete the pending request for `resource`, if any.
    ///
    /// Replies with no waiting request (e.g. after a client-side
    /// timeout) are dropped.
    pub fn complete(&self, resource: &ResourceKey, reply: LockReply) {
        let sender = self
            .inner
            .lock()
            .expect("pending requests poisoned")
            .remove(resource);
        if let Some(tx) = sender {
            // The receiver may have been dropped by a timed-out caller.
            let _ = tx.send(reply);
        }
    }

    /// Forget the pending request for `resource` (after a timeout).
    pub fn remove(&self, resource: &ResourceKey) {
        self.inner
            .lock()
            .expect("pending requests poisoned")
            .remove(resource);
    }

    /// Drop every pending request. Their receivers observe a closed
    /// channel. Called when the connection is lost.
    pub fn fail_all(&self) {
        self.inner.lock().expect("pending requests poisoned").clear();
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending requests poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ResourceKey {
        ResourceKey::new("inventory", "42")
    }

    #[tokio::test]
    async fn complete_resolves_the_waiter() {
        let pending = PendingRequests::new();
        let rx = pending.register(key());

        pending.complete(&key(), LockReply::Granted);

        assert_eq!(rx.await.unwrap(), LockReply::Granted);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn complete_without_waiter_is_dropped() {
        let pending = PendingRequests::new();
        // No registration: nothing to do, nothing to panic about.
        pending.complete(&key(), LockReply::Granted);
    }

    #[tokio::test]
    async fn fail_all_closes_every_waiter() {
        let pending = PendingRequests::new();
        let rx1 = pending.register(ResourceKey::new("inventory", "1"));
        let rx2 = pending.register(ResourceKey::new("job", "2"));

        pending.fail_all();

        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[tokio::test]
    async fn reregistering_replaces_the_prior_waiter() {
        let pending = PendingRequests::new();
        let old_rx = pending.register(key());
        let new_rx = pending.register(key());

        pending.complete(&key(), LockReply::Granted);

        assert!(old_rx.await.is_err(), "replaced waiter should be cancelled");
        assert_eq!(new_rx.await.unwrap(), LockReply::Granted);
    }
}
