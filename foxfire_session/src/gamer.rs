// Gamer identities and their per-tick packet queues.
//
// A `Gamer` is one player identity with a session-unique, host-assigned ID.
// Local gamers (owned by this process) additionally carry inbound and
// outbound packet queues; remote gamers are roster entries only. Queue
// discipline follows the orchestrator's update phases: outbound packets are
// flushed and recycled at the start of a tick, inbound packets read through
// `receive_data` are parked on a consumed list and recycled one tick later.

use std::collections::VecDeque;

use foxfire_protocol::{DeliveryMode, GamerId};

use crate::packet::Packet;
use crate::transport::EndPoint;

/// A signed-in player identity waiting to become a session gamer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub gamertag: String,
    pub display_name: String,
}

impl PlayerIdentity {
    pub fn new(gamertag: impl Into<String>) -> Self {
        let gamertag = gamertag.into();
        Self {
            display_name: gamertag.clone(),
            gamertag,
        }
    }

    pub fn with_display_name(gamertag: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            gamertag: gamertag.into(),
            display_name: display_name.into(),
        }
    }
}

/// Which machine owns a gamer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineKey {
    Local,
    Remote(EndPoint),
}

/// A packet delivered to a local gamer, tagged with the sending gamer when
/// it still exists.
#[derive(Debug)]
pub struct InboundPacket {
    pub packet: Packet,
    pub sender: Option<GamerId>,
}

/// A packet queued by a local gamer, flushed on the next update tick.
#[derive(Debug)]
pub(crate) struct OutboundPacket {
    pub packet: Packet,
    pub recipient: Option<GamerId>,
    pub delivery: DeliveryMode,
}

#[derive(Debug, Default)]
struct LocalQueues {
    inbound: VecDeque<InboundPacket>,
    consumed: Vec<Packet>,
    outbound: Vec<OutboundPacket>,
}

/// One player identity in the session roster.
#[derive(Debug)]
pub struct Gamer {
    pub id: GamerId,
    pub gamertag: String,
    pub display_name: String,
    pub is_guest: bool,
    pub is_host: bool,
    pub is_private_slot: bool,
    pub is_ready: bool,
    machine: MachineKey,
    queues: Option<LocalQueues>,
}

impl Gamer {
    pub(crate) fn new_local(
        id: GamerId,
        identity: PlayerIdentity,
        is_guest: bool,
        is_host: bool,
    ) -> Self {
        Self {
            id,
            gamertag: identity.gamertag,
            display_name: identity.display_name,
            is_guest,
            is_host,
            is_private_slot: false,
            is_ready: false,
            machine: MachineKey::Local,
            queues: Some(LocalQueues::default()),
        }
    }

    pub(crate) fn new_remote(
        id: GamerId,
        gamertag: String,
        display_name: String,
        is_guest: bool,
        is_host: bool,
        is_private_slot: bool,
        endpoint: EndPoint,
    ) -> Self {
        Self {
            id,
            gamertag,
            display_name,
            is_guest,
            is_host,
            is_private_slot,
            is_ready: false,
            machine: MachineKey::Remote(endpoint),
            queues: None,
        }
    }

    pub fn machine(&self) -> MachineKey {
        self.machine
    }

    pub fn is_local(&self) -> bool {
        self.machine == MachineKey::Local
    }

    /// Packets waiting to be read through `Session::receive_data`.
    pub fn inbound_count(&self) -> usize {
        self.queues.as_ref().map_or(0, |q| q.inbound.len())
    }

    pub(crate) fn push_inbound(&mut self, packet: InboundPacket) {
        if let Some(queues) = &mut self.queues {
            queues.inbound.push_back(packet);
        }
    }

    pub(crate) fn pop_inbound(&mut self) -> Option<InboundPacket> {
        self.queues.as_mut()?.inbound.pop_front()
    }

    pub(crate) fn push_consumed(&mut self, packet: Packet) {
        if let Some(queues) = &mut self.queues {
            queues.consumed.push(packet);
        }
    }

    pub(crate) fn drain_consumed(&mut self) -> Vec<Packet> {
        self.queues
            .as_mut()
            .map_or_else(Vec::new, |q| std::mem::take(&mut q.consumed))
    }

    pub(crate) fn push_outbound(&mut self, packet: OutboundPacket) {
        if let Some(queues) = &mut self.queues {
            queues.outbound.push(packet);
        }
    }

    pub(crate) fn drain_outbound(&mut self) -> Vec<OutboundPacket> {
        self.queues
            .as_mut()
            .map_or_else(Vec::new, |q| std::mem::take(&mut q.outbound))
    }

    /// Tear down all queues, returning every held packet for recycling.
    pub(crate) fn drain_all_packets(&mut self) -> Vec<Packet> {
        let Some(queues) = &mut self.queues else {
            return Vec::new();
        };
        let mut packets: Vec<Packet> = queues.inbound.drain(..).map(|p| p.packet).collect();
        packets.append(&mut queues.consumed);
        packets.extend(queues.outbound.drain(..).map(|p| p.packet));
        packets
    }
}
