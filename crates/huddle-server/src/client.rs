use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use huddle_core::ids::{ConnectionId, PairId};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::actor::Inbound;
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_DISCONNECTIONS_TOTAL};

/// A connected WebSocket client.
pub struct Client {
    pub id: ConnectionId,
    pair_id: RwLock<Option<PairId>>,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Client {
    fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            pair_id: RwLock::new(None),
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn pair_id(&self) -> Option<PairId> {
        self.pair_id.read().clone()
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }

    /// Queue a frame without waiting. Full or closed queues drop it.
    fn try_send(&self, message: String) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection_id = %self.id,
                    msg_len = msg.len(),
                    "send queue full, dropping message"
                );
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                false
            }
        }
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all live WebSocket connections and the pair scope each
/// belongs to.
pub struct ClientRegistry {
    clients: DashMap<ConnectionId, Arc<Client>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new connection and return its ID + outbound receiver.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients.insert(id.clone(), Arc::new(Client::new(id.clone(), tx)));
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.clients.len() as f64);
        (id, rx)
    }

    /// Remove a connection. Returns false if it was already gone. Dropping
    /// the entry closes its outbound queue, which ends its writer task.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        match self.clients.remove(id) {
            Some((_, client)) => {
                client.connected.store(false, Ordering::Relaxed);
                counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
                gauge!(WS_CONNECTIONS_ACTIVE).set(self.clients.len() as f64);
                true
            }
            None => false,
        }
    }

    /// Add a connection to a pair's broadcast scope.
    pub fn bind_pair(&self, id: &ConnectionId, pair_id: &PairId) {
        if let Some(client) = self.clients.get(id) {
            *client.pair_id.write() = Some(pair_id.clone());
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Client>> {
        self.clients.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Send a frame to one connection.
    pub fn send_to(&self, id: &ConnectionId, message: String) -> bool {
        match self.get(id) {
            Some(client) => client.try_send(message),
            None => false,
        }
    }

    /// Send a frame to every live connection. Returns how many accepted it.
    pub fn broadcast_all(&self, message: &str) -> usize {
        self.broadcast_where(message, |_| true)
    }

    /// Send a frame to the members of one pair.
    pub fn broadcast_to_pair(&self, pair_id: &PairId, message: &str) -> usize {
        self.broadcast_where(message, |c| c.pair_id.read().as_ref() == Some(pair_id))
    }

    fn broadcast_where(&self, message: &str, predicate: impl Fn(&Client) -> bool) -> usize {
        // Collect first so no map shard stays locked while sending.
        let targets: Vec<Arc<Client>> = self
            .clients
            .iter()
            .filter(|entry| entry.is_connected() && predicate(entry.value().as_ref()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        targets
            .iter()
            .filter(|client| client.try_send(message.to_string()))
            .count()
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Remove clients that haven't answered a ping within `timeout`.
    pub fn cleanup_dead_clients(&self, timeout: Duration) -> Vec<ConnectionId> {
        let dead: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|entry| !entry.is_alive(timeout))
            .map(|entry| entry.key().clone())
            .collect();

        dead.into_iter()
            .filter(|id| {
                let removed = self.unregister(id);
                if removed {
                    tracing::info!(connection_id = %id, "cleaned up dead client");
                }
                removed
            })
            .collect()
    }
}

/// Handle a WebSocket connection: split into reader/writer, manage lifecycle
/// with heartbeat. Text frames are forwarded to the session actor; when the
/// connection ends the actor is told exactly once.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    inbound: mpsc::Sender<Inbound>,
    heartbeat: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued frames to the socket + periodic ping
    let writer_cid = connection_id.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_cid, "sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader task: forward text frames to the actor, track pongs
    let reader_cid = connection_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader_inbound = inbound.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let command = Inbound::Command {
                        connection: reader_cid.clone(),
                        raw: text.to_string(),
                    };
                    if reader_inbound.send(command).await.is_err() {
                        break;
                    }
                }
                WsMessage::Pong(_) => {
                    if let Some(client) = reader_registry.get(&reader_cid) {
                        client.record_pong();
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever task finishes first ends the connection; stop the other.
    let (mut writer, mut reader) = (writer, reader);
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    if registry.unregister(&connection_id) {
        tracing::info!(connection_id = %connection_id, "client disconnected");
        let _ = inbound
            .send(Inbound::Disconnected {
                connection: connection_id,
            })
            .await;
    }
}

/// Start a background task that periodically removes dead clients and
/// reports each one to the session actor.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    interval: Duration,
    timeout: Duration,
    inbound: mpsc::Sender<Inbound>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_clients(timeout);
            if removed.is_empty() {
                continue;
            }
            tracing::info!(removed = removed.len(), "dead client cleanup");
            for connection in removed {
                if inbound.send(Inbound::Disconnected { connection }).await.is_err() {
                    return;
                }
            }
        }
    })
}
