//! Payload fan-out within a room.
//!
//! Delivery is live-only and best-effort: each recipient is attempted
//! independently, a stale connection is skipped, and a room with no other
//! members drops the payload. There is no store-and-forward; a peer that was
//! absent never sees what it missed.

use std::sync::Arc;

use tracing::debug;

use crate::metrics::GatewayMetrics;
use crate::protocol::{Message, ServerEvent};
use crate::rooms::{ConnId, Role, RoomDirectory};

pub struct RelayEngine {
    rooms: Arc<RoomDirectory>,
    metrics: Arc<GatewayMetrics>,
}

impl RelayEngine {
    pub fn new(rooms: Arc<RoomDirectory>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { rooms, metrics }
    }

    /// Deliver `message` unmodified to every member of the room except the
    /// sending connection. Returns the delivered count.
    pub fn relay(&self, room_id: &str, sender: ConnId, message: Message) -> usize {
        let mut delivered = 0;
        for member in self.rooms.members_except(room_id, sender) {
            let event = ServerEvent::ReceiveData {
                payload: message.clone(),
            };
            if member.tx.send(event).is_ok() {
                delivered += 1;
                self.metrics.messages_relayed.inc();
            } else {
                // Recipient task is gone; its leave is racing us. Skip it,
                // keep going for the rest.
                debug!(room = room_id, conn = %member.conn, "dropping delivery to stale connection");
                self.metrics.deliveries_dropped.inc();
            }
        }
        delivered
    }

    /// Tell existing members that a peer joined. The wire contract only
    /// signals the mobile side's arrival; a desktop joining second is silent.
    pub fn notify_join(&self, room_id: &str, joiner: ConnId, role: Role) {
        if role != Role::Mobile {
            return;
        }
        self.send_to_others(room_id, joiner, ServerEvent::MobileConnected);
    }

    /// Symmetric departure signal so the remaining peer can update its state.
    pub fn notify_leave(&self, room_id: &str, leaver: ConnId) {
        self.send_to_others(room_id, leaver, ServerEvent::PeerDisconnected);
    }

    fn send_to_others(&self, room_id: &str, exclude: ConnId, event: ServerEvent) {
        for member in self.rooms.members_except(room_id, exclude) {
            if member.tx.send(event.clone()).is_err() {
                debug!(room = room_id, conn = %member.conn, "dropping notification to stale connection");
                self.metrics.deliveries_dropped.inc();
            }
        }
    }
}
