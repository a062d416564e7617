//! Wire contract between clients and the gateway.
//!
//! Frames travel as JSON text over the WebSocket, tagged by `event`. Payloads
//! are the `Message` tagged union; the gateway never looks past the `kind`
//! discriminator and the sender id used for echo suppression.

use serde::{Deserialize, Serialize};

/// Relayed payload. File contents and MIME type are opaque to the gateway;
/// `data` is whatever self-describing encoding the client chose (base64 data
/// URLs in practice).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Message {
    Text {
        value: String,
        #[serde(rename = "senderId")]
        sender_id: String,
        /// Client-supplied epoch milliseconds.
        timestamp: u64,
    },
    File {
        name: String,
        mime: String,
        data: String,
        #[serde(rename = "senderId")]
        sender_id: String,
        timestamp: u64,
    },
}

impl Message {
    pub fn sender_id(&self) -> &str {
        match self {
            Message::Text { sender_id, .. } => sender_id,
            Message::File { sender_id, .. } => sender_id,
        }
    }
}

/// Client-to-gateway events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Desktop role joins a room.
    PcJoin {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// Mobile role joins a room.
    MobileJoin {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    /// Relay request.
    SendData {
        #[serde(rename = "roomId")]
        room_id: String,
        payload: Message,
    },
}

/// Gateway-to-client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// The mobile peer joined the room.
    MobileConnected,
    /// The other peer left the room or dropped.
    PeerDisconnected,
    /// Delivered payload. Carries the original sender id so recipients can
    /// suppress their own echo.
    ReceiveData { payload: Message },
    /// A join request was refused (unknown room, occupied role slot).
    JoinRejected { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_match_wire_shape() {
        let ev: ClientEvent =
            serde_json::from_value(json!({"event": "pc-join", "roomId": "r-abc"})).unwrap();
        assert_eq!(
            ev,
            ClientEvent::PcJoin {
                room_id: "r-abc".into()
            }
        );

        let ev: ClientEvent = serde_json::from_value(json!({
            "event": "send-data",
            "roomId": "r-abc",
            "payload": {"kind": "text", "value": "hi", "senderId": "m1", "timestamp": 1000},
        }))
        .unwrap();
        match ev {
            ClientEvent::SendData { room_id, payload } => {
                assert_eq!(room_id, "r-abc");
                assert_eq!(payload.sender_id(), "m1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn server_events_serialize_with_kebab_tags() {
        let v = serde_json::to_value(&ServerEvent::MobileConnected).unwrap();
        assert_eq!(v, json!({"event": "mobile-connected"}));

        let v = serde_json::to_value(&ServerEvent::PeerDisconnected).unwrap();
        assert_eq!(v, json!({"event": "peer-disconnected"}));
    }

    #[test]
    fn file_message_roundtrips_unmodified() {
        let msg = Message::File {
            name: "photo.png".into(),
            mime: "image/png".into(),
            data: "data:image/png;base64,AAAA".into(),
            sender_id: "m1".into(),
            timestamp: 1234,
        };
        let wire = serde_json::to_string(&ServerEvent::ReceiveData {
            payload: msg.clone(),
        })
        .unwrap();
        assert!(wire.contains("\"kind\":\"file\""));
        assert!(wire.contains("\"senderId\":\"m1\""));
        let back: ServerEvent = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, ServerEvent::ReceiveData { payload: msg });
    }
}
