//! Per-connection session handling.
//!
//! Each WebSocket gets one task, a fresh connection id, and an unbounded
//! outbound channel. The task multiplexes inbound frames against queued
//! outbound events with `select!`, so a single connection's deliveries stay
//! in FIFO order. Protocol handling lives in [`Session`], which has no
//! socket dependency and is exercised directly by the integration tests.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::protocol::{ClientEvent, Message, ServerEvent};
use crate::rooms::{ConnId, Member, OutboundTx, Role};

// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let ws = ws.max_message_size(state.config.max_frame_bytes);
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let metrics = state.metrics.clone();
    let mut session = Session::new(state, tx);

    metrics.connected_clients.inc();
    debug!(conn = %session.conn(), "client connected");

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => session.on_event(event),
                            Err(err) => {
                                warn!(conn = %session.conn(), error = %err, "malformed client frame, skipping");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Pings are answered by the socket layer; binary frames
                    // are not part of the contract.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(conn = %session.conn(), error = %err, "socket error, treating as leave");
                        break;
                    }
                }
            }
            outbound = rx.recv() => {
                let Some(event) = outbound else { break };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(conn = %session.conn(), error = %err, "failed to encode outbound event");
                        continue;
                    }
                };
                if socket.send(WsMessage::Text(frame)).await.is_err() {
                    break;
                }
            }
        }
    }

    session.on_close();
    metrics.connected_clients.dec();
    debug!(conn = %session.conn(), "client disconnected");
}

/// Protocol state for one connection: its id, its outbound handle, and the
/// room it is bound to (at most one at a time).
pub struct Session {
    state: AppState,
    conn: ConnId,
    tx: OutboundTx,
    binding: Option<(String, Role)>,
}

impl Session {
    pub fn new(state: AppState, tx: OutboundTx) -> Self {
        Self {
            state,
            conn: Uuid::new_v4(),
            tx,
            binding: None,
        }
    }

    pub fn conn(&self) -> ConnId {
        self.conn
    }

    pub fn on_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::PcJoin { room_id } => self.join(room_id, Role::Desktop),
            ClientEvent::MobileJoin { room_id } => self.join(room_id, Role::Mobile),
            ClientEvent::SendData { room_id, payload } => self.send_data(&room_id, payload),
        }
    }

    /// Disconnect path: implicit leave, with the departure signaled to the
    /// remaining peer.
    pub fn on_close(&mut self) {
        self.leave_current();
    }

    fn join(&mut self, room_id: String, role: Role) {
        // At most one room per connection. This also frees our own slot on a
        // re-join of the same room, so a retry is not rejected against
        // ourselves.
        self.leave_current();

        let member = Member {
            conn: self.conn,
            role,
            tx: self.tx.clone(),
        };
        match self.state.rooms.join(&room_id, member) {
            Ok(ack) => {
                info!(conn = %self.conn, room = %room_id, %role, members = ack.members, "joined room");
                self.binding = Some((room_id.clone(), role));
                if ack.members > 1 {
                    self.state.relay.notify_join(&room_id, self.conn, role);
                }
            }
            Err(err) => {
                warn!(conn = %self.conn, room = %room_id, %role, error = %err, "join rejected");
                let _ = self.tx.send(ServerEvent::JoinRejected {
                    message: err.to_string(),
                });
            }
        }
    }

    fn send_data(&self, room_id: &str, payload: Message) {
        match &self.binding {
            Some((bound, _)) if bound == room_id => {
                let delivered = self.state.relay.relay(room_id, self.conn, payload);
                debug!(conn = %self.conn, room = %room_id, delivered, "relayed payload");
            }
            _ => {
                warn!(conn = %self.conn, room = %room_id, "send-data for a room this connection has not joined, dropping");
            }
        }
    }

    fn leave_current(&mut self) {
        if let Some((room_id, _)) = self.binding.take() {
            if self.state.rooms.leave(&room_id, self.conn) {
                info!(conn = %self.conn, room = %room_id, "left room");
                self.state.relay.notify_leave(&room_id, self.conn);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // A task that unwinds before reaching on_close must still release
        // its room slot.
        self.leave_current();
    }
}
