// Session adverts and matchmaking properties.
//
// `SessionAdvert` is the payload a host attaches to a discovery response so
// searchers can present the session before joining. The same struct doubles
// as the public info a host registers with the master server — both paths
// describe "a joinable session" with the same fields.
//
// `SessionProperties` is the game-defined matchmaking filter: a short list
// of indexed optional integers (map id, game mode, skill bracket, ...).
// `None` entries are wildcards when matching a search filter, so a searcher
// only constrains the slots it cares about.

use crate::types::SessionKind;
use crate::wire::{PacketReader, PacketWriter, WireError};

/// Game-defined matchmaking properties, matched slot-by-slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionProperties(pub Vec<Option<i32>>);

impl SessionProperties {
    /// True when every constrained slot of `search` equals this session's
    /// value for that slot. `None` search slots match anything, including
    /// sessions that never set the slot.
    pub fn matches(&self, search: &SessionProperties) -> bool {
        search.0.iter().enumerate().all(|(i, wanted)| match wanted {
            None => true,
            Some(value) => self.0.get(i).copied().flatten() == Some(*value),
        })
    }

    pub fn encode(&self, w: &mut PacketWriter) {
        assert!(self.0.len() <= usize::from(u8::MAX));
        #[expect(clippy::cast_possible_truncation)]
        w.write_u8(self.0.len() as u8);
        for slot in &self.0 {
            w.write_bool(slot.is_some());
            w.write_i32(slot.unwrap_or(0));
        }
    }

    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let count = r.read_u8()?;
        let mut slots = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let set = r.read_bool()?;
            let value = r.read_i32()?;
            slots.push(set.then_some(value));
        }
        Ok(SessionProperties(slots))
    }
}

/// What a host advertises about its session: the discovery response payload
/// and the master server's per-host public info.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionAdvert {
    pub kind: SessionKind,
    pub max_gamers: i32,
    pub private_slots: i32,
    pub current_gamer_count: i32,
    pub host_gamertag: String,
    pub open_private_slots: i32,
    pub open_public_slots: i32,
    pub properties: SessionProperties,
}

impl SessionAdvert {
    pub fn encode(&self, w: &mut PacketWriter) {
        w.write_u8(self.kind.to_byte());
        w.write_i32(self.max_gamers);
        w.write_i32(self.private_slots);
        w.write_i32(self.current_gamer_count);
        w.write_string(&self.host_gamertag);
        w.write_i32(self.open_private_slots);
        w.write_i32(self.open_public_slots);
        self.properties.encode(w);
    }

    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let raw_kind = r.read_u8()?;
        let kind = SessionKind::from_byte(raw_kind).ok_or(WireError::InvalidSessionKind(raw_kind))?;
        Ok(SessionAdvert {
            kind,
            max_gamers: r.read_i32()?,
            private_slots: r.read_i32()?,
            current_gamer_count: r.read_i32()?,
            host_gamertag: r.read_string()?,
            open_private_slots: r.read_i32()?,
            open_public_slots: r.read_i32()?,
            properties: SessionProperties::decode(r)?,
        })
    }

    /// Encode as a standalone discovery-response payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = PacketWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    /// Decode from a standalone discovery-response payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Self::decode(&mut PacketReader::new(bytes))
    }
}
