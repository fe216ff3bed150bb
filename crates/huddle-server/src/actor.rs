//! Session actor: the single task that owns the session state.
//!
//! Every socket feeds one bounded channel. The actor handles one message at
//! a time and enqueues all resulting frames before reading the next, so
//! per-connection FIFO holds without locking session state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use huddle_core::commands::Command;
use huddle_core::events::{Envelope, Scope};
use huddle_core::ids::ConnectionId;
use huddle_core::model::PhaseName;
use huddle_session::SessionGateway;
use metrics::counter;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::ClientRegistry;
use crate::metrics::{COMMANDS_TOTAL, COMMAND_REJECTIONS_TOTAL, UNKNOWN_METHOD};
use crate::rpc::{RpcRequest, RpcResponse};
use crate::wire;

/// Messages consumed by the session actor.
#[derive(Debug)]
pub enum Inbound {
    /// A raw text frame from a connection.
    Command { connection: ConnectionId, raw: String },
    /// The connection is gone (close, error, or reaped).
    Disconnected { connection: ConnectionId },
}

pub struct SessionActor {
    gateway: SessionGateway,
    registry: Arc<ClientRegistry>,
    phase_tx: watch::Sender<PhaseName>,
    auto_review: bool,
}

impl SessionActor {
    pub fn new(registry: Arc<ClientRegistry>, auto_review: bool) -> (Self, watch::Receiver<PhaseName>) {
        let (phase_tx, phase_rx) = watch::channel(PhaseName::Lobby);
        let actor = Self {
            gateway: SessionGateway::new(),
            registry,
            phase_tx,
            auto_review,
        };
        (actor, phase_rx)
    }

    pub fn spawn(self, rx: mpsc::Receiver<Inbound>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Process messages until every sender is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Inbound>) {
        loop {
            let deadline = self.armed_deadline();
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
                _ = sleep_until(deadline) => self.on_deadline(Utc::now()),
            }
        }
        info!("session actor stopped");
    }

    /// The deadline to wake up for, if automatic review is enabled and the
    /// session is active.
    fn armed_deadline(&self) -> Option<DateTime<Utc>> {
        if !self.auto_review {
            return None;
        }
        self.gateway.phase().deadline()
    }

    pub fn handle(&mut self, msg: Inbound) {
        match msg {
            Inbound::Command { connection, raw } => self.on_command(&connection, &raw),
            Inbound::Disconnected { connection } => {
                let outbound = self.gateway.disconnect(&connection);
                self.deliver(&outbound);
            }
        }
    }

    fn on_command(&mut self, connection: &ConnectionId, raw: &str) {
        // Late frames from a socket already reported as disconnected.
        if self.registry.get(connection).is_none() {
            debug!(connection_id = %connection, "dropping frame from closed connection");
            return;
        }
        let request: RpcRequest = match serde_json::from_str(raw) {
            Ok(req) => req,
            Err(e) => {
                warn!(connection_id = %connection, error = %e, "unparseable frame");
                counter!(COMMAND_REJECTIONS_TOTAL, "code" => crate::rpc::PARSE_ERROR).increment(1);
                self.reply(connection, &RpcResponse::parse_error());
                return;
            }
        };
        let label = Command::known_method(&request.method).unwrap_or(UNKNOWN_METHOD);
        counter!(COMMANDS_TOTAL, "method" => label).increment(1);

        let params = request.params.unwrap_or_default();
        let dispatch = self
            .gateway
            .dispatch(connection, &request.method, &params, Utc::now());

        if let Err(e) = &dispatch.reply {
            counter!(COMMAND_REJECTIONS_TOTAL, "code" => e.code()).increment(1);
        }
        for (member, pair_id) in &dispatch.scope_joins {
            self.registry.bind_pair(member, pair_id);
        }
        self.reply(connection, &RpcResponse::from_result(request.id, dispatch.reply));
        self.deliver(&dispatch.outbound);
        self.publish_phase();
    }

    fn on_deadline(&mut self, now: DateTime<Utc>) {
        let outbound = self.gateway.deadline_elapsed(now);
        self.deliver(&outbound);
        self.publish_phase();
    }

    fn reply(&self, connection: &ConnectionId, response: &RpcResponse) {
        match serde_json::to_string(response) {
            Ok(json) => {
                self.registry.send_to(connection, json);
            }
            Err(e) => warn!(connection_id = %connection, error = %e, "failed to serialize response"),
        }
    }

    /// Fan out broadcasts in order, resolving each scope against the live
    /// connections.
    fn deliver(&self, outbound: &[Envelope]) {
        for envelope in outbound {
            let frame = match wire::to_frame(&envelope.broadcast) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, event = envelope.broadcast.event_type(), "failed to serialize broadcast");
                    continue;
                }
            };
            let delivered = match &envelope.scope {
                Scope::All => self.registry.broadcast_all(&frame),
                Scope::Pair(pair_id) => self.registry.broadcast_to_pair(pair_id, &frame),
                Scope::Connection(id) => usize::from(self.registry.send_to(id, frame)),
            };
            debug!(
                event = envelope.broadcast.event_type(),
                scope = envelope.scope.label(),
                delivered,
                "broadcast"
            );
        }
    }

    fn publish_phase(&self) {
        let phase = self.gateway.phase().name();
        self.phase_tx.send_if_modified(|current| {
            let changed = *current != phase;
            *current = phase;
            changed
        });
    }
}

async fn sleep_until(deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(deadline) => {
            let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending().await,
    }
}
