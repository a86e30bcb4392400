//! Connection lifecycle and the lock-aware binding.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use shopfloor_core::protocol::{ClientMessage, LockEntry, ServerMessage};
use shopfloor_core::resource::ResourceKey;
use shopfloor_core::types::DbId;

use crate::locks::LockView;
use crate::reconnect::{next_delay, ReconnectConfig};
use crate::requests::{LockReply, LockRequestError, PendingRequests};
use crate::subscriptions::{Subscription, SubscriptionManager};

/// How long `acquire` waits for a grant or denial.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings and the identity to register with.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:5000/api/v1/ws`.
    pub url: String,
    /// Identity announced in the `register` handshake and carried on
    /// every lock request.
    pub user_id: DbId,
    pub username: String,
    /// Window for `acquire` to resolve. Defaults to five seconds.
    pub request_timeout: Duration,
    /// Reconnection policy after a dropped connection.
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, user_id: DbId, username: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id,
            username: username.into(),
            request_timeout: REQUEST_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Handle to the real-time server for one user.
///
/// Construction spawns a background connection task (connect, register,
/// dispatch, reconnect with backoff); the handle itself never blocks on
/// the network except inside [`acquire`](Self::acquire).
pub struct RealtimeClient {
    user_id: DbId,
    username: String,
    request_timeout: Duration,
    subscriptions: Arc<SubscriptionManager>,
    lock_view: Arc<LockView>,
    pending: Arc<PendingRequests>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl RealtimeClient {
    /// Spawn the connection task and return the handle immediately.
    ///
    /// The connection is established in the background; until it is up,
    /// [`acquire`](Self::acquire) fails fast with
    /// [`LockRequestError::NotConnected`].
    pub fn connect(config: ClientConfig) -> Self {
        let subscriptions = Arc::new(SubscriptionManager::new());
        let lock_view = Arc::new(LockView::new());
        let pending = Arc::new(PendingRequests::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected) = watch::channel(false);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_connection(ConnectionContext {
            url: config.url,
            user_id: config.user_id,
            username: config.username.clone(),
            reconnect: config.reconnect,
            outbound_rx,
            connected_tx,
            subscriptions: Arc::clone(&subscriptions),
            lock_view: Arc::clone(&lock_view),
            pending: Arc::clone(&pending),
            cancel: cancel.clone(),
        }));

        Self {
            user_id: config.user_id,
            username: config.username,
            request_timeout: config.request_timeout,
            subscriptions,
            lock_view,
            pending,
            outbound,
            connected,
            cancel,
            task,
        }
    }

    /// Whether a live, registered connection exists right now.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until the connection is up, bounded by `timeout`.
    ///
    /// Returns `false` if the deadline passed or the connection task
    /// gave up.
    pub async fn wait_until_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.connected.clone();
        let wait = tokio::time::timeout(timeout, async {
            loop {
                if *rx.borrow() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;

        wait.is_ok() && self.is_connected()
    }

    /// Request an exclusive edit lock and await the outcome.
    ///
    /// Resolves `Ok(())` on grant; fails with
    /// [`Denied`](LockRequestError::Denied) naming the current holder,
    /// [`Timeout`](LockRequestError::Timeout) when no reply arrives in
    /// the request window, or [`NotConnected`](LockRequestError::NotConnected)
    /// immediately when the coordinator is unreachable. On timeout a
    /// release is sent for the key: if a grant raced the deadline the
    /// lock goes straight back, and otherwise the release is a no-op.
    pub async fn acquire(&self, resource: ResourceKey) -> Result<(), LockRequestError> {
        if !self.is_connected() {
            return Err(LockRequestError::NotConnected);
        }

        let reply = self.pending.register(resource.clone());
        let request = ClientMessage::RequestEditLock {
            item_id: resource.id.clone(),
            item_type: resource.kind.clone(),
            user_id: self.user_id,
            username: self.username.clone(),
        };
        if self.outbound.send(request).is_err() {
            self.pending.remove(&resource);
            return Err(LockRequestError::NotConnected);
        }

        match tokio::time::timeout(self.request_timeout, reply).await {
            Ok(Ok(LockReply::Granted)) => Ok(()),
            Ok(Ok(LockReply::Denied { locked_by, message })) => {
                Err(LockRequestError::Denied { locked_by, message })
            }
            Ok(Err(_closed)) => Err(LockRequestError::ConnectionClosed),
            Err(_elapsed) => {
                self.pending.remove(&resource);
                tracing::warn!(resource = %resource, "Lock request timed out");
                self.release(resource);
                Err(LockRequestError::Timeout)
            }
        }
    }

    /// Release a held lock. Fire-and-forget: a release while
    /// disconnected is dropped (the disconnect already released
    /// server-side).
    pub fn release(&self, resource: ResourceKey) {
        if !self.is_connected() {
            tracing::debug!(resource = %resource, "Not connected, skipping lock release");
            return;
        }
        let _ = self.outbound.send(ClientMessage::ReleaseEditLock {
            item_id: resource.id,
            item_type: resource.kind,
        });
    }

    /// Register a handler for a wire event name
    /// (e.g. `"inventory-update"`, `"edit-lock-acquired"`).
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(event, handler)
    }

    /// Whether anyone holds a lock on the resource, per the local mirror.
    pub fn is_locked(&self, resource: &ResourceKey) -> bool {
        self.lock_view.is_locked(resource)
    }

    /// Who holds the lock on the resource, per the local mirror.
    pub fn lock_holder(&self, resource: &ResourceKey) -> Option<LockEntry> {
        self.lock_view.holder(resource)
    }

    /// Whether this client's user holds the lock on the resource.
    pub fn is_held_by_me(&self, resource: &ResourceKey) -> bool {
        self.lock_view.is_held_by(resource, self.user_id)
    }

    /// Close the connection and stop the background task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

/// Everything the background connection task needs.
struct ConnectionContext {
    url: String,
    user_id: DbId,
    username: String,
    reconnect: ReconnectConfig,
    outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
    connected_tx: watch::Sender<bool>,
    subscriptions: Arc<SubscriptionManager>,
    lock_view: Arc<LockView>,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Core connection loop: connect -> register -> dispatch -> reconnect.
///
/// Runs until shutdown or until the reconnect budget is spent.
async fn run_connection(mut ctx: ConnectionContext) {
    let mut delay = ctx.reconnect.initial_delay;
    let mut attempts = 0u32;

    loop {
        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(&ctx.url) => result,
        };

        match result {
            Ok((ws, _response)) => {
                tracing::info!(url = %ctx.url, "Connected to realtime server");
                attempts = 0;
                delay = ctx.reconnect.initial_delay;

                // Messages queued while disconnected are stale; their
                // callers have already failed fast or timed out.
                while ctx.outbound_rx.try_recv().is_ok() {}

                let _ = ctx.connected_tx.send(true);
                run_session(&mut ctx, ws).await;
                let _ = ctx.connected_tx.send(false);

                // Server-side session state died with the connection.
                ctx.lock_view.clear();
                ctx.pending.fail_all();

                if ctx.cancel.is_cancelled() {
                    return;
                }
                tracing::info!("Connection lost");
            }
            Err(e) => {
                tracing::warn!(url = %ctx.url, error = %e, "Failed to connect to realtime server");
            }
        }

        attempts += 1;
        if attempts > ctx.reconnect.max_attempts {
            tracing::error!(attempts, "Reconnect budget exhausted, giving up");
            return;
        }
        tracing::info!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to realtime server"
        );
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = next_delay(delay, &ctx.reconnect);
    }
}

/// Drive one established connection until it drops or shutdown.
async fn run_session(ctx: &mut ConnectionContext, ws: WsStream) {
    let (mut sink, mut stream) = ws.split();

    // Announce identity first; the server answers with the lock snapshot.
    let register = ClientMessage::Register {
        user_id: ctx.user_id,
        username: ctx.username.clone(),
    };
    if send_message(&mut sink, &register).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            Some(message) = ctx.outbound_rx.recv() => {
                if send_message(&mut sink, &message).await.is_err() {
                    return;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&text, &ctx.subscriptions, &ctx.lock_view, &ctx.pending);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {
                    // Binary and Pong frames carry no protocol meaning.
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket receive error");
                    return;
                }
            }
        }
    }
}

async fn send_message<S>(sink: &mut S, message: &ClientMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize client message");
            return Ok(());
        }
    };
    sink.send(Message::Text(json)).await.map_err(|_| {
        tracing::debug!("WebSocket sink closed");
    })
}

/// Route one inbound frame to the lock mirror, pending requests, and
/// event subscribers.
fn handle_frame(
    text: &str,
    subscriptions: &SubscriptionManager,
    lock_view: &LockView,
    pending: &PendingRequests,
) {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed frame");
            return;
        }
    };

    lock_view.apply(&message);

    match &message {
        ServerMessage::EditLockGranted { .. } => {
            if let Some(key) = message.lock_resource() {
                pending.complete(&key, LockReply::Granted);
            }
        }
        ServerMessage::EditLockDenied {
            locked_by,
            message: reason,
            ..
        } => {
            if let Some(key) = message.lock_resource() {
                pending.complete(
                    &key,
                    LockReply::Denied {
                        locked_by: locked_by.clone(),
                        message: reason.clone(),
                    },
                );
            }
        }
        _ => {}
    }

    match serde_json::to_value(&message) {
        Ok(payload) => subscriptions.dispatch(message.event_name(), &payload),
        Err(e) => tracing::error!(error = %e, "Failed to re-serialize frame for dispatch"),
    }
}
