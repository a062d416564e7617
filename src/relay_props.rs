use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::metrics::GatewayMetrics;
use crate::protocol::{Message, ServerEvent};
use crate::registry::{CodeRegistry, CODE_MAX, CODE_MIN};
use crate::relay::RelayEngine;
use crate::rooms::{Member, Role, RoomDirectory};

proptest! {
    // Property: issued codes are always 4 digits in range and verify to the
    // room they were minted with, exactly once.
    #[test]
    fn issued_codes_verify_exactly_once(batch in 1usize..50) {
        let registry = CodeRegistry::new(Duration::from_secs(300));
        let mut issued = Vec::new();
        for _ in 0..batch {
            let code = registry.generate().unwrap();
            prop_assert_eq!(code.code.len(), 4);
            let n: u32 = code.code.parse().unwrap();
            prop_assert!((CODE_MIN..=CODE_MAX).contains(&n));
            issued.push(code);
        }

        for code in &issued {
            prop_assert_eq!(registry.verify(&code.code).unwrap(), code.room_id.clone());
            prop_assert!(registry.verify(&code.code).is_err());
        }
        prop_assert_eq!(registry.outstanding(), 0);
    }

    // Property: arbitrary candidates that were never issued are rejected.
    #[test]
    fn unissued_candidates_are_rejected(candidate in "[0-9]{1,8}") {
        let registry = CodeRegistry::new(Duration::from_secs(300));
        prop_assert!(registry.verify(&candidate).is_err());
    }

    // Property: a payload sequence from one sender arrives at the peer
    // complete, in order, byte for byte, and never echoes back.
    #[test]
    fn relay_preserves_order_and_content(
        values in prop::collection::vec(".*", 1..20),
    ) {
        let rooms = Arc::new(RoomDirectory::new());
        let relay = RelayEngine::new(rooms.clone(), Arc::new(GatewayMetrics::new().unwrap()));
        rooms.create("r-prop");

        let (desktop_tx, mut desktop_rx) = mpsc::unbounded_channel();
        let (mobile_tx, mut mobile_rx) = mpsc::unbounded_channel();
        let desktop = Uuid::new_v4();
        let mobile = Uuid::new_v4();
        rooms.join("r-prop", Member { conn: desktop, role: Role::Desktop, tx: desktop_tx }).unwrap();
        rooms.join("r-prop", Member { conn: mobile, role: Role::Mobile, tx: mobile_tx }).unwrap();

        let sent: Vec<Message> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Message::Text {
                value: v.clone(),
                sender_id: "m1".to_string(),
                timestamp: i as u64,
            })
            .collect();

        for message in &sent {
            prop_assert_eq!(relay.relay("r-prop", mobile, message.clone()), 1);
        }

        for expected in &sent {
            match desktop_rx.try_recv() {
                Ok(ServerEvent::ReceiveData { payload }) => prop_assert_eq!(&payload, expected),
                other => prop_assert!(false, "expected delivery, got {:?}", other),
            }
        }
        prop_assert!(desktop_rx.try_recv().is_err());
        prop_assert!(mobile_rx.try_recv().is_err());
    }
}
