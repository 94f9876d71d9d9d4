// Core ID and mode types for the session protocol.
//
// These are lightweight types used by both `message.rs` (protocol messages)
// and the session orchestrator (`foxfire_session`). Gamer IDs are compact
// host-assigned bytes, not player account identifiers — the host hands them
// out from a monotonic counter for efficient wire representation.

/// Host-assigned gamer ID, unique for the lifetime of a session.
///
/// IDs are drawn strictly increasing from the host's counter and are never
/// reused while the session is alive. The value 255 is reserved as the
/// broadcast sentinel on the wire and is never assigned to a gamer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GamerId(pub u8);

impl GamerId {
    /// Wire sentinel standing for "all gamers" in a user message recipient
    /// field. Not a valid gamer ID.
    pub const BROADCAST_SENTINEL: u8 = 255;

    /// Largest ID the host may assign.
    pub const MAX_ASSIGNABLE: u8 = 254;
}

impl std::fmt::Display for GamerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of session being hosted or searched for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    /// Single-machine session, never advertised.
    Local,
    /// LAN session discovered by subnet broadcast.
    SystemLink,
    /// Internet session listed by the master server.
    PlayerMatch,
    /// Internet session with arbitrated results.
    Ranked,
}

impl SessionKind {
    pub fn to_byte(self) -> u8 {
        match self {
            SessionKind::Local => 0,
            SessionKind::SystemLink => 1,
            SessionKind::PlayerMatch => 2,
            SessionKind::Ranked => 3,
        }
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(SessionKind::Local),
            1 => Some(SessionKind::SystemLink),
            2 => Some(SessionKind::PlayerMatch),
            3 => Some(SessionKind::Ranked),
            _ => None,
        }
    }
}

/// Reliability/ordering contract for a single send.
///
/// Control messages are always `ReliableOrdered`; user messages pick a mode
/// at send time. Ordering guarantees hold per sequencing channel between two
/// machines, never across channels or senders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Best effort, may drop, may reorder.
    Unreliable,
    /// May drop; stale messages are discarded so delivery order matches
    /// send order for the messages that do arrive.
    Sequenced,
    /// Never drops, may reorder.
    Reliable,
    /// Never drops, delivery order matches send order.
    ReliableOrdered,
}

/// Sequencing channel carrying all protocol-control traffic.
pub const CHANNEL_CONTROL: u8 = 1;

/// Sequencing channel carrying application payloads.
pub const CHANNEL_USER: u8 = 0;
