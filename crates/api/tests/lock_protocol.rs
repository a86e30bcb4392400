//! End-to-end protocol tests over the real transport plumbing.
//!
//! These tests wire the lock coordinator to `WsManager` exactly as the
//! server does, but observe each connection's outbound channel directly
//! instead of opening sockets. Every assertion is over the JSON frames a
//! browser client would actually receive.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc::UnboundedReceiver;

use shopfloor_api::updates::UpdateForwarder;
use shopfloor_api::ws::WsManager;
use shopfloor_core::protocol::{ChangeAction, ServerMessage};
use shopfloor_core::resource::ResourceKey;
use shopfloor_realtime::{Broadcaster, ChangeEvent, CoordinatorHandle, EventBus, LockCoordinator};

async fn setup() -> (Arc<WsManager>, CoordinatorHandle) {
    let manager = Arc::new(WsManager::new());
    let broadcaster: Arc<dyn Broadcaster> = manager.clone();
    let (coordinator, _task) = LockCoordinator::start(broadcaster);
    (manager, coordinator)
}

/// Drain every frame currently queued for a connection, parsed as
/// protocol messages. Call after a coordinator barrier (`snapshot`).
fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Message::Text(text) = msg {
            out.push(serde_json::from_str(text.as_str()).expect("frame should parse"));
        }
    }
    out
}

fn key(kind: &str, id: &str) -> ResourceKey {
    ResourceKey::new(kind, id)
}

#[tokio::test]
async fn register_receives_lock_snapshot_frame() {
    let (manager, coordinator) = setup().await;

    // Alice connects and takes a lock before Bob joins.
    let mut rx_a = manager.add("conn-a".to_string()).await;
    coordinator.register("conn-a".into(), 1, "alice".into());
    coordinator.request_lock(key("inventory", "42"), "conn-a".into(), 1, "alice".into());
    coordinator.snapshot().await.unwrap();
    drain(&mut rx_a);

    // Bob joins late; his first frame is the snapshot.
    let mut rx_b = manager.add("conn-b".to_string()).await;
    coordinator.register("conn-b".into(), 2, "bob".into());
    coordinator.snapshot().await.unwrap();

    let frames = drain(&mut rx_b);
    match frames.first() {
        Some(ServerMessage::EditLocksSync { locks }) => {
            assert_eq!(locks.len(), 1);
            assert_eq!(locks[0].item_id, "42");
            assert_eq!(locks[0].item_type, "inventory");
            assert_eq!(locks[0].username, "alice");
        }
        other => panic!("expected edit-locks-sync first, got {other:?}"),
    }
}

#[tokio::test]
async fn contention_over_the_wire() {
    let (manager, coordinator) = setup().await;

    let mut rx_a = manager.add("conn-a".to_string()).await;
    let mut rx_b = manager.add("conn-b".to_string()).await;
    coordinator.register("conn-a".into(), 1, "alice".into());
    coordinator.register("conn-b".into(), 2, "bob".into());
    coordinator.snapshot().await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    // A acquires: both see the acquired broadcast, only A gets granted.
    coordinator.request_lock(key("inventory", "42"), "conn-a".into(), 1, "alice".into());
    coordinator.snapshot().await.unwrap();

    let frames_a = drain(&mut rx_a);
    assert!(frames_a
        .iter()
        .any(|m| matches!(m, ServerMessage::EditLockAcquired { username, .. } if username == "alice")));
    assert!(frames_a
        .iter()
        .any(|m| matches!(m, ServerMessage::EditLockGranted { .. })));

    let frames_b = drain(&mut rx_b);
    assert!(frames_b
        .iter()
        .any(|m| matches!(m, ServerMessage::EditLockAcquired { .. })));
    assert!(!frames_b
        .iter()
        .any(|m| matches!(m, ServerMessage::EditLockGranted { .. })));

    // B contends: only B hears the denial, and it names alice.
    coordinator.request_lock(key("inventory", "42"), "conn-b".into(), 2, "bob".into());
    coordinator.snapshot().await.unwrap();

    assert!(drain(&mut rx_a).is_empty());
    let frames_b = drain(&mut rx_b);
    assert_eq!(frames_b.len(), 1);
    match &frames_b[0] {
        ServerMessage::EditLockDenied {
            locked_by, message, ..
        } => {
            assert_eq!(locked_by, "alice");
            assert!(message.contains("alice"));
        }
        other => panic!("expected denial, got {other:?}"),
    }

    // A releases: both hear it; then B succeeds.
    coordinator.release_lock(key("inventory", "42"), "conn-a".into());
    coordinator.snapshot().await.unwrap();
    assert!(drain(&mut rx_a)
        .iter()
        .any(|m| matches!(m, ServerMessage::EditLockReleased { .. })));
    assert!(drain(&mut rx_b)
        .iter()
        .any(|m| matches!(m, ServerMessage::EditLockReleased { .. })));

    coordinator.request_lock(key("inventory", "42"), "conn-b".into(), 2, "bob".into());
    coordinator.snapshot().await.unwrap();
    assert!(drain(&mut rx_b)
        .iter()
        .any(|m| matches!(m, ServerMessage::EditLockGranted { .. })));
}

#[tokio::test]
async fn disconnect_auto_releases_over_the_wire() {
    let (manager, coordinator) = setup().await;

    let mut rx_a = manager.add("conn-a".to_string()).await;
    let mut rx_b = manager.add("conn-b".to_string()).await;
    coordinator.register("conn-a".into(), 1, "alice".into());
    coordinator.register("conn-b".into(), 2, "bob".into());
    coordinator.request_lock(key("job", "7"), "conn-a".into(), 1, "alice".into());
    coordinator.snapshot().await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    // A's connection drops without releasing.
    manager.remove("conn-a").await;
    coordinator.connection_closed("conn-a".into());
    let snapshot = coordinator.snapshot().await.unwrap();

    assert!(snapshot.is_empty(), "lock table should be empty");
    let frames_b = drain(&mut rx_b);
    assert_eq!(
        frames_b,
        vec![ServerMessage::EditLockReleased {
            item_id: "7".into(),
            item_type: "job".into(),
        }]
    );
}

#[tokio::test]
async fn change_events_fan_out_to_every_client_once() {
    let (manager, _coordinator) = setup().await;

    let bus = Arc::new(EventBus::default());
    let forwarder = UpdateForwarder::new(Arc::clone(&manager));
    let _task = tokio::spawn(forwarder.run(bus.subscribe()));

    let mut rx_a = manager.add("conn-a".to_string()).await;
    let mut rx_b = manager.add("conn-b".to_string()).await;

    bus.publish(ChangeEvent::inventory(
        ChangeAction::Updated,
        serde_json::json!({"id": 42, "quantity": 3}),
    ));

    for rx in [&mut rx_a, &mut rx_b] {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("client should receive the update")
            .expect("channel should be open");
        let Message::Text(text) = msg else {
            panic!("expected text frame");
        };
        let parsed: ServerMessage = serde_json::from_str(text.as_str()).unwrap();
        match parsed {
            ServerMessage::InventoryUpdate { action, item, .. } => {
                assert_eq!(action, ChangeAction::Updated);
                assert_eq!(item["id"], 42);
            }
            other => panic!("expected inventory-update, got {other:?}"),
        }

        // Exactly once each.
        assert!(rx.try_recv().is_err());
    }
}
