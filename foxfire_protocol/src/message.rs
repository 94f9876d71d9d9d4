// Protocol messages exchanged between session machines.
//
// `SessionMessage` is a closed sum type over the seven message kinds the
// session protocol speaks. Each variant owns its wire encoding; the trigger
// logic that applies a received message to session state lives in
// `foxfire_session`, so encoding never mutates state and decoding only
// extracts fields. That separation keeps the codec replayable and testable
// without any network I/O.
//
// Wire layout: one kind byte (the variant ordinal below), then the variant's
// fields in declaration order using the `wire.rs` primitives. Receiving an
// ordinal outside the table is a protocol error (`WireError::UnknownKind`).
//
// Delivery: every control message travels `ReliableOrdered` on the control
// channel. User messages pick their mode at send time and always use the
// user channel, so application traffic can never stall control ordering.

use std::net::SocketAddr;

use crate::types::{CHANNEL_CONTROL, DeliveryMode, GamerId};
use crate::wire::{PacketReader, PacketWriter, WireError};

const KIND_CONNECT_TO_ALL_REQUEST: u8 = 0;
const KIND_FULLY_CONNECTED: u8 = 1;
const KIND_GAMER_JOIN_REQUEST: u8 = 2;
const KIND_GAMER_JOIN_RESPONSE: u8 = 3;
const KIND_GAMER_JOINED: u8 = 4;
const KIND_GAMER_LEFT: u8 = 5;
const KIND_USER_MESSAGE: u8 = 6;

/// One protocol message, control or application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionMessage {
    /// Host to a newly connected peer: the set of existing peers it must
    /// open direct connections to before it counts as fully connected.
    ConnectToAllRequest { end_points: Vec<SocketAddr> },
    /// Any machine to all: the sender now holds a live connection to every
    /// endpoint in its required set.
    FullyConnected,
    /// Fully connected peer to host: request one new gamer ID.
    GamerJoinRequest,
    /// Host to the requesting peer: the assigned ID, or `None` when the
    /// host denied the request.
    GamerJoinResponse { assigned: Option<GamerId> },
    /// Any machine to all: a gamer now exists on the sending machine.
    GamerJoined {
        display_name: String,
        gamertag: String,
        id: GamerId,
        is_guest: bool,
        is_host: bool,
        is_private_slot: bool,
    },
    /// Owning machine to all: the gamer left the session.
    GamerLeft { id: GamerId },
    /// Application payload routed between gamers. `recipient` of `None`
    /// means every gamer.
    UserMessage {
        sender: GamerId,
        recipient: Option<GamerId>,
        payload: Vec<u8>,
    },
}

impl SessionMessage {
    /// Fixed delivery contract. `None` for user messages, which choose
    /// their mode at send time on the user channel.
    pub fn control_delivery(&self) -> Option<(DeliveryMode, u8)> {
        match self {
            SessionMessage::UserMessage { .. } => None,
            _ => Some((DeliveryMode::ReliableOrdered, CHANNEL_CONTROL)),
        }
    }

    pub fn kind(&self) -> u8 {
        match self {
            SessionMessage::ConnectToAllRequest { .. } => KIND_CONNECT_TO_ALL_REQUEST,
            SessionMessage::FullyConnected => KIND_FULLY_CONNECTED,
            SessionMessage::GamerJoinRequest => KIND_GAMER_JOIN_REQUEST,
            SessionMessage::GamerJoinResponse { .. } => KIND_GAMER_JOIN_RESPONSE,
            SessionMessage::GamerJoined { .. } => KIND_GAMER_JOINED,
            SessionMessage::GamerLeft { .. } => KIND_GAMER_LEFT,
            SessionMessage::UserMessage { .. } => KIND_USER_MESSAGE,
        }
    }

    /// Encode the kind byte and all fields into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u8(self.kind());
        match self {
            SessionMessage::ConnectToAllRequest { end_points } => {
                assert!(end_points.len() <= usize::from(u16::MAX));
                #[expect(clippy::cast_possible_truncation)]
                w.write_u16(end_points.len() as u16);
                for end_point in end_points {
                    w.write_end_point(*end_point);
                }
            }
            SessionMessage::FullyConnected | SessionMessage::GamerJoinRequest => {}
            SessionMessage::GamerJoinResponse { assigned } => {
                w.write_bool(assigned.is_some());
                w.write_u8(assigned.map_or(GamerId::BROADCAST_SENTINEL, |id| id.0));
            }
            SessionMessage::GamerJoined {
                display_name,
                gamertag,
                id,
                is_guest,
                is_host,
                is_private_slot,
            } => {
                w.write_string(display_name);
                w.write_string(gamertag);
                w.write_u8(id.0);
                w.write_bool(*is_guest);
                w.write_bool(*is_host);
                w.write_bool(*is_private_slot);
            }
            SessionMessage::GamerLeft { id } => {
                w.write_u8(id.0);
            }
            SessionMessage::UserMessage {
                sender,
                recipient,
                payload,
            } => {
                w.write_u8(sender.0);
                w.write_bool(recipient.is_none());
                w.write_u8(recipient.map_or(GamerId::BROADCAST_SENTINEL, |id| id.0));
                w.write_payload(payload);
            }
        }
        w.into_bytes()
    }

    /// Decode one message from a framed datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = PacketReader::new(bytes);
        let kind = r.read_u8()?;
        match kind {
            KIND_CONNECT_TO_ALL_REQUEST => {
                let count = r.read_u16()?;
                let mut end_points = Vec::with_capacity(usize::from(count.min(64)));
                for _ in 0..count {
                    end_points.push(r.read_end_point()?);
                }
                Ok(SessionMessage::ConnectToAllRequest { end_points })
            }
            KIND_FULLY_CONNECTED => Ok(SessionMessage::FullyConnected),
            KIND_GAMER_JOIN_REQUEST => Ok(SessionMessage::GamerJoinRequest),
            KIND_GAMER_JOIN_RESPONSE => {
                let approved = r.read_bool()?;
                let raw = r.read_u8()?;
                let assigned = if approved {
                    Some(read_assigned_id(raw)?)
                } else {
                    None
                };
                Ok(SessionMessage::GamerJoinResponse { assigned })
            }
            KIND_GAMER_JOINED => Ok(SessionMessage::GamerJoined {
                display_name: r.read_string()?,
                gamertag: r.read_string()?,
                id: read_assigned_id(r.read_u8()?)?,
                is_guest: r.read_bool()?,
                is_host: r.read_bool()?,
                is_private_slot: r.read_bool()?,
            }),
            KIND_GAMER_LEFT => Ok(SessionMessage::GamerLeft {
                id: read_assigned_id(r.read_u8()?)?,
            }),
            KIND_USER_MESSAGE => {
                let sender = read_assigned_id(r.read_u8()?)?;
                let send_to_all = r.read_bool()?;
                let raw_recipient = r.read_u8()?;
                let recipient = if send_to_all {
                    None
                } else {
                    Some(read_assigned_id(raw_recipient)?)
                };
                let payload = r.read_payload()?;
                Ok(SessionMessage::UserMessage {
                    sender,
                    recipient,
                    payload,
                })
            }
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

/// Validate an ID field that must name a real gamer: 255 is the broadcast
/// sentinel and never a gamer.
fn read_assigned_id(raw: u8) -> Result<GamerId, WireError> {
    if raw == GamerId::BROADCAST_SENTINEL {
        return Err(WireError::ReservedGamerId);
    }
    Ok(GamerId(raw))
}
