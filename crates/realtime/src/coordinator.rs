//! The edit-lock protocol coordinator.
//!
//! [`LockCoordinator`] owns the [`SessionRegistry`] and [`LockTable`]
//! and drains a single command queue, one command at a time, run to
//! completion. That sequencing is the whole concurrency story: no two
//! acquisition attempts are ever evaluated against the table at once,
//! so the "at most one holder" invariant holds without any locking.
//!
//! The coordinator is an explicitly constructed service (no global
//! state): build one with [`LockCoordinator::new`], spawn
//! [`LockCoordinator::run`], and hand the [`CoordinatorHandle`] to the
//! transport layer.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use shopfloor_core::protocol::{LockEntry, ServerMessage};
use shopfloor_core::resource::ResourceKey;
use shopfloor_core::session::EditLock;
use shopfloor_core::types::{ConnectionId, DbId};

use crate::broadcaster::Broadcaster;
use crate::locks::{AcquireOutcome, LockTable};
use crate::registry::SessionRegistry;

/// A unit of work for the coordinator loop.
#[derive(Debug)]
enum Command {
    Register {
        connection_id: ConnectionId,
        user_id: DbId,
        username: String,
    },
    RequestLock {
        resource: ResourceKey,
        connection_id: ConnectionId,
        user_id: DbId,
        username: String,
    },
    ReleaseLock {
        resource: ResourceKey,
        connection_id: ConnectionId,
    },
    ConnectionClosed {
        connection_id: ConnectionId,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<EditLock>>,
    },
    Stop,
}

/// The coordinator task is no longer running.
#[derive(Debug, thiserror::Error)]
#[error("lock coordinator has stopped")]
pub struct CoordinatorStopped;

/// Cheaply cloneable handle for submitting commands to the coordinator.
///
/// All mutating operations are fire-and-forget: they enqueue a command
/// and return immediately. Commands are processed strictly in enqueue
/// order, which is also the tie-break order for contending requests.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Bind an identity to a connection. The coordinator replies with a
    /// targeted `edit-locks-sync` snapshot.
    pub fn register(&self, connection_id: ConnectionId, user_id: DbId, username: String) {
        let _ = self.tx.send(Command::Register {
            connection_id,
            user_id,
            username,
        });
    }

    /// Request an exclusive edit lock.
    pub fn request_lock(
        &self,
        resource: ResourceKey,
        connection_id: ConnectionId,
        user_id: DbId,
        username: String,
    ) {
        let _ = self.tx.send(Command::RequestLock {
            resource,
            connection_id,
            user_id,
            username,
        });
    }

    /// Release a held edit lock. Idempotent; never errors.
    pub fn release_lock(&self, resource: ResourceKey, connection_id: ConnectionId) {
        let _ = self.tx.send(Command::ReleaseLock {
            resource,
            connection_id,
        });
    }

    /// Notify the coordinator that a connection closed, releasing every
    /// lock it held.
    pub fn connection_closed(&self, connection_id: ConnectionId) {
        let _ = self.tx.send(Command::ConnectionClosed { connection_id });
    }

    /// Fetch the current lock table contents.
    ///
    /// Because commands are processed in order, awaiting a snapshot also
    /// acts as a barrier: everything enqueued before it has been applied.
    pub async fn snapshot(&self) -> Result<Vec<EditLock>, CoordinatorStopped> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .map_err(|_| CoordinatorStopped)?;
        rx.await.map_err(|_| CoordinatorStopped)
    }

    /// Ask the coordinator loop to exit. Commands enqueued before the
    /// stop are still processed.
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }
}

/// Sequential edit-lock state machine.
pub struct LockCoordinator {
    registry: SessionRegistry,
    locks: LockTable,
    broadcaster: Arc<dyn Broadcaster>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl LockCoordinator {
    /// Create a coordinator wired to the given transport.
    ///
    /// Returns the coordinator (to be driven via [`run`](Self::run))
    /// and the handle for submitting commands.
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            registry: SessionRegistry::new(),
            locks: LockTable::new(),
            broadcaster,
            rx,
        };
        (coordinator, CoordinatorHandle { tx })
    }

    /// Spawn the coordinator onto the runtime.
    ///
    /// Convenience for the common case; returns the handle and the task
    /// join handle for shutdown sequencing.
    pub fn start(
        broadcaster: Arc<dyn Broadcaster>,
    ) -> (CoordinatorHandle, tokio::task::JoinHandle<()>) {
        let (coordinator, handle) = Self::new(broadcaster);
        let join = tokio::spawn(coordinator.run());
        (handle, join)
    }

    /// Drive the command loop until [`CoordinatorHandle::stop`] is called
    /// or every handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Lock coordinator started");

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Register {
                    connection_id,
                    user_id,
                    username,
                } => self.handle_register(connection_id, user_id, username).await,
                Command::RequestLock {
                    resource,
                    connection_id,
                    user_id,
                    username,
                } => {
                    self.handle_request(resource, connection_id, user_id, username)
                        .await
                }
                Command::ReleaseLock {
                    resource,
                    connection_id,
                } => self.handle_release(resource, connection_id).await,
                Command::ConnectionClosed { connection_id } => {
                    self.handle_disconnect(connection_id).await
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.locks.snapshot());
                }
                Command::Stop => break,
            }
        }

        tracing::info!(
            sessions = self.registry.len(),
            locks = self.locks.len(),
            "Lock coordinator stopped"
        );
    }

    async fn handle_register(&mut self, connection_id: ConnectionId, user_id: DbId, username: String) {
        tracing::info!(conn_id = %connection_id, user_id, username = %username, "User registered");
        self.registry
            .register(connection_id.clone(), user_id, username);

        // Bring the new connection's lock view up to date before it sees
        // any future lock events.
        let locks: Vec<LockEntry> = self.locks.snapshot().iter().map(LockEntry::from).collect();
        self.broadcaster
            .send_to(&connection_id, ServerMessage::EditLocksSync { locks })
            .await;
    }

    async fn handle_request(
        &mut self,
        resource: ResourceKey,
        connection_id: ConnectionId,
        user_id: DbId,
        username: String,
    ) {
        let outcome = self.locks.acquire(
            resource.clone(),
            connection_id.clone(),
            user_id,
            username.clone(),
        );

        match outcome {
            AcquireOutcome::Granted => {
                tracing::info!(resource = %resource, user = %username, "Edit lock granted");
                self.broadcaster
                    .broadcast(ServerMessage::EditLockAcquired {
                        item_id: resource.id.clone(),
                        item_type: resource.kind.clone(),
                        user_id,
                        username,
                    })
                    .await;
                self.broadcaster
                    .send_to(
                        &connection_id,
                        ServerMessage::EditLockGranted {
                            item_id: resource.id,
                            item_type: resource.kind,
                        },
                    )
                    .await;
            }
            AcquireOutcome::AlreadyHeld => {
                // State unchanged, so no broadcast; just confirm to the
                // requester.
                self.broadcaster
                    .send_to(
                        &connection_id,
                        ServerMessage::EditLockGranted {
                            item_id: resource.id,
                            item_type: resource.kind,
                        },
                    )
                    .await;
            }
            AcquireOutcome::Denied { holder } => {
                tracing::debug!(resource = %resource, holder = %holder, "Edit lock denied");
                let message = format!(
                    "This {} is currently being edited by {}",
                    resource.kind, holder
                );
                self.broadcaster
                    .send_to(
                        &connection_id,
                        ServerMessage::EditLockDenied {
                            item_id: resource.id,
                            item_type: resource.kind,
                            locked_by: holder,
                            message,
                        },
                    )
                    .await;
            }
        }
    }

    async fn handle_release(&mut self, resource: ResourceKey, connection_id: ConnectionId) {
        if self.locks.release(&resource, &connection_id) {
            tracing::info!(resource = %resource, "Edit lock released");
            self.broadcaster
                .broadcast(ServerMessage::EditLockReleased {
                    item_id: resource.id,
                    item_type: resource.kind,
                })
                .await;
        } else {
            // Unheld or already released -- expected when a release races
            // disconnect cleanup.
            tracing::debug!(resource = %resource, "Release of unheld lock ignored");
        }
    }

    async fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let removed = self.locks.release_all_for(&connection_id);
        if !removed.is_empty() {
            tracing::info!(
                conn_id = %connection_id,
                count = removed.len(),
                "Auto-releasing locks for closed connection"
            );
        }
        for lock in removed {
            self.broadcaster
                .broadcast(ServerMessage::EditLockReleased {
                    item_id: lock.resource.id,
                    item_type: lock.resource.kind,
                })
                .await;
        }

        if let Some(session) = self.registry.unregister(&connection_id) {
            // A user with other tabs still open stays present.
            let remaining = self.registry.connections_for_user(session.user_id).len();
            tracing::info!(
                conn_id = %connection_id,
                user = %session.username,
                remaining_connections = remaining,
                "Session unregistered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// What a [`RecordingBroadcaster`] saw, in delivery order.
    #[derive(Debug, Clone, PartialEq)]
    enum Delivery {
        Broadcast(ServerMessage),
        Targeted(String, ServerMessage),
    }

    #[derive(Default)]
    struct RecordingBroadcaster {
        deliveries: Mutex<Vec<Delivery>>,
    }

    impl RecordingBroadcaster {
        async fn take(&self) -> Vec<Delivery> {
            std::mem::take(&mut *self.deliveries.lock().await)
        }
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn broadcast(&self, message: ServerMessage) {
            self.deliveries.lock().await.push(Delivery::Broadcast(message));
        }

        async fn send_to(&self, connection_id: &str, message: ServerMessage) {
            self.deliveries
                .lock()
                .await
                .push(Delivery::Targeted(connection_id.to_string(), message));
        }
    }

    fn setup() -> (
        Arc<RecordingBroadcaster>,
        CoordinatorHandle,
        tokio::task::JoinHandle<()>,
    ) {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let (handle, join) = LockCoordinator::start(broadcaster.clone());
        (broadcaster, handle, join)
    }

    fn key(kind: &str, id: &str) -> ResourceKey {
        ResourceKey::new(kind, id)
    }

    #[tokio::test]
    async fn contention_scenario_grant_deny_release_regrant() {
        let (broadcaster, handle, _join) = setup();

        handle.register("conn-a".into(), 1, "alice".into());
        handle.register("conn-b".into(), 2, "bob".into());
        handle.snapshot().await.unwrap();
        broadcaster.take().await; // discard the two sync messages

        // A acquires (inventory, 42).
        handle.request_lock(key("inventory", "42"), "conn-a".into(), 1, "alice".into());
        handle.snapshot().await.unwrap();

        let deliveries = broadcaster.take().await;
        assert_eq!(
            deliveries,
            vec![
                Delivery::Broadcast(ServerMessage::EditLockAcquired {
                    item_id: "42".into(),
                    item_type: "inventory".into(),
                    user_id: 1,
                    username: "alice".into(),
                }),
                Delivery::Targeted(
                    "conn-a".into(),
                    ServerMessage::EditLockGranted {
                        item_id: "42".into(),
                        item_type: "inventory".into(),
                    }
                ),
            ]
        );

        // B requests the same resource: denied, message names alice,
        // nothing broadcast.
        handle.request_lock(key("inventory", "42"), "conn-b".into(), 2, "bob".into());
        handle.snapshot().await.unwrap();

        let deliveries = broadcaster.take().await;
        assert_eq!(deliveries.len(), 1);
        match &deliveries[0] {
            Delivery::Targeted(conn, ServerMessage::EditLockDenied { locked_by, message, .. }) => {
                assert_eq!(conn, "conn-b");
                assert_eq!(locked_by, "alice");
                assert!(message.contains("alice"), "message should name the holder");
            }
            other => panic!("expected targeted denial, got {other:?}"),
        }

        // A releases; everyone hears about it.
        handle.release_lock(key("inventory", "42"), "conn-a".into());
        handle.snapshot().await.unwrap();
        assert_eq!(
            broadcaster.take().await,
            vec![Delivery::Broadcast(ServerMessage::EditLockReleased {
                item_id: "42".into(),
                item_type: "inventory".into(),
            })]
        );

        // B can now take the lock.
        handle.request_lock(key("inventory", "42"), "conn-b".into(), 2, "bob".into());
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].username, "bob");
    }

    #[tokio::test]
    async fn reentrant_request_grants_without_broadcast() {
        let (broadcaster, handle, _join) = setup();

        handle.request_lock(key("job", "7"), "conn-a".into(), 1, "alice".into());
        handle.snapshot().await.unwrap();
        broadcaster.take().await;

        // Same connection asks again.
        handle.request_lock(key("job", "7"), "conn-a".into(), 1, "alice".into());
        handle.snapshot().await.unwrap();
        assert_eq!(
            broadcaster.take().await,
            vec![Delivery::Targeted(
                "conn-a".into(),
                ServerMessage::EditLockGranted {
                    item_id: "7".into(),
                    item_type: "job".into(),
                }
            )]
        );

        // Same user from another connection: also a quiet grant.
        handle.request_lock(key("job", "7"), "conn-a2".into(), 1, "alice".into());
        handle.snapshot().await.unwrap();
        assert_eq!(
            broadcaster.take().await,
            vec![Delivery::Targeted(
                "conn-a2".into(),
                ServerMessage::EditLockGranted {
                    item_id: "7".into(),
                    item_type: "job".into(),
                }
            )]
        );
    }

    #[tokio::test]
    async fn disconnect_releases_every_held_lock() {
        let (broadcaster, handle, _join) = setup();

        handle.register("conn-a".into(), 1, "alice".into());
        handle.request_lock(key("job", "7"), "conn-a".into(), 1, "alice".into());
        handle.request_lock(key("inventory", "3"), "conn-a".into(), 1, "alice".into());
        handle.request_lock(key("job", "9"), "conn-b".into(), 2, "bob".into());
        handle.snapshot().await.unwrap();
        broadcaster.take().await;

        handle.connection_closed("conn-a".into());
        let snapshot = handle.snapshot().await.unwrap();

        // Exactly alice's two locks were released, bob's survives.
        let deliveries = broadcaster.take().await;
        let released: Vec<_> = deliveries
            .iter()
            .filter(|d| matches!(d, Delivery::Broadcast(ServerMessage::EditLockReleased { .. })))
            .collect();
        assert_eq!(released.len(), 2);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].resource, key("job", "9"));
    }

    #[tokio::test]
    async fn disconnect_with_no_locks_broadcasts_nothing() {
        let (broadcaster, handle, _join) = setup();

        handle.register("conn-a".into(), 1, "alice".into());
        handle.snapshot().await.unwrap();
        broadcaster.take().await;

        handle.connection_closed("conn-a".into());
        handle.snapshot().await.unwrap();
        assert!(broadcaster.take().await.is_empty());
    }

    #[tokio::test]
    async fn release_of_unheld_lock_is_silent() {
        let (broadcaster, handle, _join) = setup();

        handle.release_lock(key("inventory", "42"), "conn-a".into());
        handle.snapshot().await.unwrap();
        assert!(broadcaster.take().await.is_empty());

        // Held by someone else: also silent, state unchanged.
        handle.request_lock(key("inventory", "42"), "conn-a".into(), 1, "alice".into());
        handle.snapshot().await.unwrap();
        broadcaster.take().await;

        handle.release_lock(key("inventory", "42"), "conn-b".into());
        let snapshot = handle.snapshot().await.unwrap();
        assert!(broadcaster.take().await.is_empty());
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn late_registration_receives_exact_snapshot() {
        let (broadcaster, handle, _join) = setup();

        handle.request_lock(key("inventory", "1"), "conn-a".into(), 1, "alice".into());
        handle.request_lock(key("job", "2"), "conn-b".into(), 2, "bob".into());
        handle.snapshot().await.unwrap();
        broadcaster.take().await;

        handle.register("conn-c".into(), 3, "carol".into());
        handle.snapshot().await.unwrap();

        let deliveries = broadcaster.take().await;
        assert_eq!(deliveries.len(), 1);
        match &deliveries[0] {
            Delivery::Targeted(conn, ServerMessage::EditLocksSync { locks }) => {
                assert_eq!(conn, "conn-c");
                assert_eq!(locks.len(), 2);
                let mut kinds: Vec<_> = locks.iter().map(|l| l.item_type.as_str()).collect();
                kinds.sort();
                assert_eq!(kinds, vec!["inventory", "job"]);
            }
            other => panic!("expected targeted sync, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_terminates_the_loop() {
        let (_broadcaster, handle, join) = setup();

        handle.stop();
        join.await.expect("coordinator task should exit cleanly");

        // Further commands are dropped and snapshot reports the stop.
        assert!(handle.snapshot().await.is_err());
    }
}
