// foxfire_protocol — wire protocol for multiplayer session communication.
//
// This crate defines the message kinds, byte-level encoding, and discovery/
// master-server payloads spoken by the session orchestrator
// (`foxfire_session`) and the master server (`foxfire_master`). It is shared
// between both sides and has no dependency on any transport or session state.
//
// Module overview:
// - `types.rs`:   Core types — `GamerId`, `SessionKind`, `DeliveryMode`,
//                 sequencing channel constants.
// - `wire.rs`:    `PacketWriter`/`PacketReader` — little-endian integers,
//                 length-prefixed UTF-8 strings, tagged socket addresses.
// - `message.rs`: `SessionMessage`, the closed sum type over the seven
//                 protocol kinds, with its kind-byte codec.
// - `advert.rs`:  `SessionAdvert` (discovery response / master public info)
//                 and `SessionProperties` (matchmaking filters).
// - `master.rs`:  Master-server envelopes — `MasterRequest`/`MasterResponse`
//                 with app-id and payload-secret validation fields.
//
// Design decisions:
// - **Hand-rolled byte codec.** The protocol's wire format is one kind byte
//   plus fixed-order fields; messages are tiny and latency-sensitive, so
//   there is no reflective or self-describing serialization layer.
// - **Payloads as opaque `Vec<u8>`.** The protocol never inspects user
//   message payloads, keeping this crate independent of any game.
// - **Decode never trusts the peer.** Every length is bounds-checked, kind
//   bytes outside the table are errors, and gamer id 255 (the broadcast
//   sentinel) is rejected wherever a real gamer must be named.

pub mod advert;
pub mod master;
pub mod message;
pub mod types;
pub mod wire;

pub use advert::{SessionAdvert, SessionProperties};
pub use master::{MasterEnvelope, MasterRequest, MasterResponse};
pub use message::SessionMessage;
pub use types::{CHANNEL_CONTROL, CHANNEL_USER, DeliveryMode, GamerId, SessionKind};
pub use wire::{MAX_USER_PAYLOAD, PacketReader, PacketWriter, WireError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode a message, decode it back, and require an exact match.
    fn roundtrip(msg: &SessionMessage) {
        let recovered = SessionMessage::decode(&msg.encode()).unwrap();
        assert_eq!(&recovered, msg);
    }

    #[test]
    fn roundtrip_connect_to_all_request() {
        roundtrip(&SessionMessage::ConnectToAllRequest {
            end_points: vec![
                "10.0.0.2:14242".parse().unwrap(),
                "10.0.0.3:14242".parse().unwrap(),
            ],
        });
    }

    #[test]
    fn roundtrip_connect_to_all_request_empty() {
        roundtrip(&SessionMessage::ConnectToAllRequest { end_points: vec![] });
    }

    #[test]
    fn roundtrip_fully_connected() {
        roundtrip(&SessionMessage::FullyConnected);
    }

    #[test]
    fn roundtrip_gamer_join_request() {
        roundtrip(&SessionMessage::GamerJoinRequest);
    }

    #[test]
    fn roundtrip_gamer_join_response_approved() {
        roundtrip(&SessionMessage::GamerJoinResponse {
            assigned: Some(GamerId(0)),
        });
        roundtrip(&SessionMessage::GamerJoinResponse {
            assigned: Some(GamerId(254)),
        });
    }

    #[test]
    fn roundtrip_gamer_join_response_denied() {
        roundtrip(&SessionMessage::GamerJoinResponse { assigned: None });
    }

    #[test]
    fn roundtrip_gamer_joined() {
        roundtrip(&SessionMessage::GamerJoined {
            display_name: "Fox".into(),
            gamertag: "FoxTag".into(),
            id: GamerId(3),
            is_guest: true,
            is_host: false,
            is_private_slot: true,
        });
    }

    #[test]
    fn roundtrip_gamer_joined_empty_names() {
        roundtrip(&SessionMessage::GamerJoined {
            display_name: String::new(),
            gamertag: String::new(),
            id: GamerId(0),
            is_guest: false,
            is_host: true,
            is_private_slot: false,
        });
    }

    #[test]
    fn roundtrip_gamer_left() {
        roundtrip(&SessionMessage::GamerLeft { id: GamerId(254) });
    }

    #[test]
    fn roundtrip_user_message_targeted() {
        roundtrip(&SessionMessage::UserMessage {
            sender: GamerId(0),
            recipient: Some(GamerId(1)),
            payload: vec![1, 2, 3, 4, 5],
        });
    }

    #[test]
    fn roundtrip_user_message_broadcast() {
        roundtrip(&SessionMessage::UserMessage {
            sender: GamerId(7),
            recipient: None,
            payload: vec![],
        });
    }

    #[test]
    fn gamer_id_255_rejected() {
        // A GamerJoined claiming the broadcast sentinel must not decode.
        let bytes = SessionMessage::GamerJoined {
            display_name: String::new(),
            gamertag: String::new(),
            id: GamerId(1),
            is_guest: false,
            is_host: false,
            is_private_slot: false,
        }
        .encode();
        let mut tampered = bytes.clone();
        // id sits after the kind byte and two empty (2-byte) string prefixes.
        tampered[5] = 255;
        assert_eq!(
            SessionMessage::decode(&tampered).unwrap_err(),
            WireError::ReservedGamerId
        );
    }

    #[test]
    fn unknown_kind_rejected() {
        assert_eq!(
            SessionMessage::decode(&[42]).unwrap_err(),
            WireError::UnknownKind(42)
        );
    }

    #[test]
    fn empty_datagram_rejected() {
        assert_eq!(
            SessionMessage::decode(&[]).unwrap_err(),
            WireError::UnexpectedEnd
        );
    }

    #[test]
    fn control_messages_are_reliable_ordered() {
        for msg in [
            SessionMessage::ConnectToAllRequest { end_points: vec![] },
            SessionMessage::FullyConnected,
            SessionMessage::GamerJoinRequest,
            SessionMessage::GamerJoinResponse { assigned: None },
            SessionMessage::GamerLeft { id: GamerId(1) },
        ] {
            assert_eq!(
                msg.control_delivery(),
                Some((DeliveryMode::ReliableOrdered, CHANNEL_CONTROL))
            );
        }
        let user = SessionMessage::UserMessage {
            sender: GamerId(0),
            recipient: None,
            payload: vec![],
        };
        assert_eq!(user.control_delivery(), None);
    }
}
