// Session orchestrator: the distributed state machine behind a multiplayer
// match.
//
// `Session` owns the machine/gamer registries, the packet pool, and the
// transport handle, and exposes the public create/find/join/send API. All
// mutation funnels through `update()`, called once per game frame:
//
//   1. recycle inbound packets consumed by gamers last tick
//   2. flush every local gamer's queued outbound packets as user messages
//   3. drain transport events (discovery, connection changes, data) and
//      dispatch decoded messages through `trigger`
//   4. if the local machine just finished its connect-to-all roster,
//      broadcast fully-connected and request IDs for pending identities
//
// Sending and triggering mirror each other: a message sent "to everyone" is
// encoded once for the transport broadcast and then triggered locally, so
// the local machine observes exactly what remote machines will.
//
// Peer misbehavior (host impersonation, gamer-id collisions, restricted
// messages before the handshake completes, undecodable datagrams) never
// panics and never kills the session: the offending machine is disconnected
// and removed. Transport contract violations, by contrast, are fatal.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use foxfire_protocol::{
    CHANNEL_CONTROL, CHANNEL_USER, DeliveryMode, GamerId, SessionAdvert, SessionKind,
    SessionMessage, SessionProperties,
};
use tracing::{debug, trace, warn};

use crate::error::{JoinError, SessionError};
use crate::gamer::{Gamer, InboundPacket, MachineKey, OutboundPacket, PlayerIdentity};
use crate::machine::{ConnectionState, Machine};
use crate::packet::PacketPool;
use crate::transport::{EndPoint, SendTarget, Transport, TransportEvent};

/// Well-known port session hosts bind and discovery requests target.
pub const SESSION_PORT: u16 = 14242;

/// Hard ceiling on `max_gamers`.
pub const MAX_SUPPORTED_GAMERS: i32 = 64;

/// Parameters for creating, finding, and joining sessions.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub kind: SessionKind,
    pub max_gamers: i32,
    pub private_slots: i32,
    pub properties: SessionProperties,
    /// Subnet port discovery requests are broadcast to.
    pub port: u16,
    /// How long `find` listens for discovery responses.
    pub discovery_window: Duration,
    /// How long `join` waits for the host connection to come up.
    pub join_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kind: SessionKind::SystemLink,
            max_gamers: 8,
            private_slots: 0,
            properties: SessionProperties::default(),
            port: SESSION_PORT,
            discovery_window: Duration::from_millis(1000),
            join_window: Duration::from_millis(1000),
        }
    }
}

/// A session discovered by `find`, joinable while its advert stays fresh.
#[derive(Clone, Debug)]
pub struct AvailableSession {
    pub host_endpoint: EndPoint,
    pub advert: SessionAdvert,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The local process disposed the session.
    Disposed,
    /// A non-host machine lost its connection to the host. Host migration
    /// is not implemented, so the whole session tears down.
    HostDisconnected,
}

/// Lifecycle notifications, drained through `poll_events`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    GamerJoined { id: GamerId },
    GamerLeft { id: GamerId, gamertag: String },
    GameStarted,
    GameEnded,
    SessionEnded { reason: EndReason },
    HostChanged { new_host: GamerId },
}

/// Lobby/gameplay phase. Stays `Lobby` until game start/end are wired up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Lobby,
    Playing,
}

/// Source and size of a packet read from a gamer's inbound queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Received {
    /// Sending gamer, when it still exists in the roster.
    pub sender: Option<GamerId>,
    pub len: usize,
}

/// Where a triggered message came from.
#[derive(Clone, Copy, Debug)]
enum Origin {
    /// Sent by this process to itself (loopback of a broadcast or a
    /// host-to-self control message).
    Local,
    /// Decoded from a datagram sent by a connected peer.
    Remote(EndPoint),
}

/// One multiplayer session: the set of cooperating machines and gamers.
///
/// At most one session exists per transport endpoint by construction — the
/// session owns the endpoint for its whole lifetime.
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    kind: SessionKind,
    properties: SessionProperties,
    is_host: bool,
    host_endpoint: Option<EndPoint>,
    max_gamers: i32,
    private_slots: i32,
    local_machine: Machine,
    machines: BTreeMap<EndPoint, Machine>,
    gamers: BTreeMap<GamerId, Gamer>,
    /// Roster in join order; drives event ordering and reverse-order removal.
    gamer_order: Vec<GamerId>,
    pending_identities: VecDeque<PlayerIdentity>,
    /// Host-only monotonic ID counter. Counts past 254 to remember
    /// exhaustion; IDs are never reused while the session lives.
    next_gamer_id: u16,
    packet_pool: PacketPool,
    events: VecDeque<SessionEvent>,
    state: SessionState,
    disposed: bool,
}

impl<T: Transport> Session<T> {
    /// Host a new session on `transport`.
    ///
    /// The local machine is immediately eligible to become fully connected,
    /// so the first `update()` admits the given identities as gamers (the
    /// first of them as the host gamer).
    pub fn create(
        transport: T,
        identities: Vec<PlayerIdentity>,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        if config.max_gamers < 2 || config.max_gamers > MAX_SUPPORTED_GAMERS {
            return Err(SessionError::MaxGamersOutOfRange(config.max_gamers));
        }
        if config.private_slots < 0 || config.private_slots > config.max_gamers {
            return Err(SessionError::PrivateSlotsOutOfRange(config.private_slots));
        }
        debug!(kind = ?config.kind, max_gamers = config.max_gamers, "hosting session");
        Ok(Self::new(
            transport,
            true,
            None,
            config.kind,
            config.max_gamers,
            config.private_slots,
            config.properties.clone(),
            identities,
        ))
    }

    /// Search the local subnet for joinable sessions of `kind`.
    ///
    /// Blocks for the configured discovery window, then returns every
    /// advert that matched `kind` and the search properties. The transport
    /// is a short-lived discovery endpoint and is shut down before return.
    pub fn find(
        mut transport: T,
        kind: SessionKind,
        search: &SessionProperties,
        config: &SessionConfig,
    ) -> Result<Vec<AvailableSession>, SessionError> {
        if kind == SessionKind::Local {
            return Err(SessionError::UnsupportedSessionKind(kind));
        }
        transport.discover(config.port);
        std::thread::sleep(config.discovery_window);

        let mut found = Vec::new();
        while let Some(event) = transport.poll_event() {
            let TransportEvent::DiscoveryResponse { sender, payload } = event else {
                continue;
            };
            match SessionAdvert::from_bytes(&payload) {
                Ok(advert) => {
                    if advert.kind == kind && advert.properties.matches(search) {
                        found.push(AvailableSession {
                            host_endpoint: sender,
                            advert,
                        });
                    }
                }
                Err(err) => {
                    debug!(%sender, %err, "ignoring malformed discovery response");
                }
            }
        }
        transport.shutdown("discovery complete");
        Ok(found)
    }

    /// Join a previously discovered session.
    ///
    /// Blocks for the configured join window; fails with
    /// `JoinError::SessionNotFound` when no connection to the host comes up
    /// in time. The local machine starts pending and the identities are
    /// admitted once the connect-to-all handshake completes.
    pub fn join(
        mut transport: T,
        available: &AvailableSession,
        identities: Vec<PlayerIdentity>,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        let advert = &available.advert;
        if advert.current_gamer_count >= advert.max_gamers {
            transport.shutdown("session full");
            return Err(SessionError::Join(JoinError::SessionFull));
        }

        transport.connect(available.host_endpoint);
        std::thread::sleep(config.join_window);
        if !transport.is_connected(available.host_endpoint) {
            transport.shutdown("join failed");
            return Err(SessionError::Join(JoinError::SessionNotFound));
        }

        debug!(host = %available.host_endpoint, "joined session");
        Ok(Self::new(
            transport,
            false,
            Some(available.host_endpoint),
            advert.kind,
            advert.max_gamers,
            advert.private_slots,
            advert.properties.clone(),
            identities,
        ))
    }

    #[expect(clippy::too_many_arguments)]
    fn new(
        transport: T,
        is_host: bool,
        host_endpoint: Option<EndPoint>,
        kind: SessionKind,
        max_gamers: i32,
        private_slots: i32,
        properties: SessionProperties,
        identities: Vec<PlayerIdentity>,
    ) -> Self {
        Self {
            transport,
            kind,
            properties,
            is_host,
            host_endpoint,
            max_gamers,
            private_slots,
            local_machine: Machine::new_local(is_host),
            machines: BTreeMap::new(),
            gamers: BTreeMap::new(),
            gamer_order: Vec::new(),
            pending_identities: identities.into(),
            next_gamer_id: 0,
            packet_pool: PacketPool::new(),
            events: VecDeque::new(),
            state: SessionState::Lobby,
            disposed: false,
        }
    }

    // ------------------------------------------------------------------
    // Per-frame update
    // ------------------------------------------------------------------

    /// The single per-frame entry point. Must be called regularly; nothing
    /// inside blocks.
    pub fn update(&mut self) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }

        self.recycle_consumed_packets();
        self.flush_outbound_packets()?;
        self.drain_transport_events()?;
        if !self.disposed {
            self.complete_pending_handshake()?;
        }
        Ok(())
    }

    /// Phase 1: return packets consumed last tick to the pool.
    fn recycle_consumed_packets(&mut self) {
        let local_ids: Vec<GamerId> = self.local_machine.gamers().to_vec();
        for id in local_ids {
            if let Some(gamer) = self.gamers.get_mut(&id) {
                for packet in gamer.drain_consumed() {
                    self.packet_pool.recycle(packet);
                }
            }
        }
    }

    /// Phase 2: wrap queued outbound packets in user messages and route
    /// them to the named recipient, to everyone, or back to this machine.
    fn flush_outbound_packets(&mut self) -> Result<(), SessionError> {
        let local_ids: Vec<GamerId> = self.local_machine.gamers().to_vec();
        for sender_id in local_ids {
            let outbound: Vec<OutboundPacket> = match self.gamers.get_mut(&sender_id) {
                Some(gamer) => gamer.drain_outbound(),
                None => continue,
            };
            for out in outbound {
                let msg = SessionMessage::UserMessage {
                    sender: sender_id,
                    recipient: out.recipient,
                    payload: out.packet.payload().to_vec(),
                };
                match out.recipient {
                    None => self.send_user_to_everyone(msg, out.delivery)?,
                    Some(recipient) => {
                        match self.gamers.get(&recipient).map(Gamer::machine) {
                            Some(MachineKey::Local) => self.trigger(msg, Origin::Local)?,
                            Some(MachineKey::Remote(peer)) => {
                                self.transport.send(
                                    &msg.encode(),
                                    SendTarget::Peer(peer),
                                    out.delivery,
                                    CHANNEL_USER,
                                );
                            }
                            None => {
                                trace!(%recipient, "dropping packet for departed gamer");
                            }
                        }
                    }
                }
                self.packet_pool.recycle(out.packet);
            }
        }
        Ok(())
    }

    /// Phase 3: drain every queued transport event.
    fn drain_transport_events(&mut self) -> Result<(), SessionError> {
        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::DiscoveryRequest { sender } => self.answer_discovery(sender),
                TransportEvent::DiscoveryResponse { .. } => {
                    // Only meaningful inside `find`.
                }
                TransportEvent::Connected { peer } => self.on_peer_connected(peer)?,
                TransportEvent::Disconnected { peer } => {
                    debug!(%peer, "peer disconnected");
                    self.drop_machine(peer);
                }
                TransportEvent::Data { sender, payload } => self.on_data(sender, &payload)?,
            }
            if self.disposed {
                break;
            }
        }
        Ok(())
    }

    /// Phase 4: once every endpoint in the local roster is live, broadcast
    /// fully-connected (exactly once) and request IDs for pending
    /// identities.
    fn complete_pending_handshake(&mut self) -> Result<(), SessionError> {
        let ready = match self.local_machine.state() {
            ConnectionState::Connecting { required } => required
                .iter()
                .all(|end_point| self.transport.is_connected(*end_point)),
            _ => false,
        };
        if !ready {
            return Ok(());
        }

        // The local trigger flips the machine to FullyConnected, so this
        // branch cannot run twice.
        self.send_control_to_everyone(SessionMessage::FullyConnected)?;
        for _ in 0..self.pending_identities.len() {
            self.send_control_to_host(SessionMessage::GamerJoinRequest)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport event handlers
    // ------------------------------------------------------------------

    fn answer_discovery(&mut self, sender: EndPoint) {
        if !self.is_host {
            return;
        }
        trace!(%sender, "answering discovery request");
        let advert = self.build_advert();
        self.transport.respond_discovery(&advert.to_bytes(), sender);
    }

    fn on_peer_connected(&mut self, peer: EndPoint) -> Result<(), SessionError> {
        debug!(%peer, "peer connected");
        let is_host_connection = Some(peer) == self.host_endpoint;
        let mut machine = Machine::new_remote(peer, is_host_connection);

        if self.is_host {
            // Snapshot the mesh this peer must complete before it counts as
            // fully connected, remember it for stall recovery, and ship it.
            let mut required: BTreeSet<EndPoint> =
                self.transport.connected_peers().into_iter().collect();
            required.remove(&peer);
            machine.set_required(required.clone());
            self.machines.insert(peer, machine);
            self.send_control_to_remote(
                &SessionMessage::ConnectToAllRequest {
                    end_points: required.into_iter().collect(),
                },
                peer,
            );
        } else {
            self.machines.insert(peer, machine);
        }
        Ok(())
    }

    fn on_data(&mut self, sender: EndPoint, payload: &[u8]) -> Result<(), SessionError> {
        if !self.machines.contains_key(&sender) {
            // The transport promised a connected event before any data.
            return Err(SessionError::Transport(format!(
                "data event from unknown peer {sender}"
            )));
        }
        match SessionMessage::decode(payload) {
            Ok(msg) => {
                trace!(kind = msg.kind(), %sender, "received message");
                self.trigger(msg, Origin::Remote(sender))
            }
            Err(err) => {
                self.kick(sender, &format!("undecodable message: {err}"));
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Message triggers
    // ------------------------------------------------------------------

    /// Apply one decoded message to session state. Triggers may enqueue
    /// further sends (a join request triggers a join response).
    fn trigger(&mut self, msg: SessionMessage, origin: Origin) -> Result<(), SessionError> {
        match msg {
            SessionMessage::ConnectToAllRequest { end_points } => {
                self.on_connect_to_all_request(end_points, origin)
            }
            SessionMessage::FullyConnected => self.on_fully_connected(origin),
            SessionMessage::GamerJoinRequest => self.on_gamer_join_request(origin),
            SessionMessage::GamerJoinResponse { assigned } => {
                self.on_gamer_join_response(assigned, origin)
            }
            SessionMessage::GamerJoined {
                display_name,
                gamertag,
                id,
                is_guest,
                is_host,
                is_private_slot,
            } => self.on_gamer_joined(
                display_name,
                gamertag,
                id,
                is_guest,
                is_host,
                is_private_slot,
                origin,
            ),
            SessionMessage::GamerLeft { id } => self.on_gamer_left(id, origin),
            SessionMessage::UserMessage {
                sender,
                recipient,
                payload,
            } => self.on_user_message(sender, recipient, &payload, origin),
        }
    }

    fn on_connect_to_all_request(
        &mut self,
        end_points: Vec<EndPoint>,
        origin: Origin,
    ) -> Result<(), SessionError> {
        let Origin::Remote(sender) = origin else {
            return Ok(());
        };
        if Some(sender) != self.host_endpoint {
            self.kick(sender, "connect-to-all request from a non-host machine");
            return Ok(());
        }

        let required: BTreeSet<EndPoint> = end_points.into_iter().collect();
        for end_point in &required {
            if !self.transport.is_connected(*end_point) {
                self.transport.connect(*end_point);
            }
        }
        debug!(count = required.len(), "received connection roster from host");
        self.local_machine.set_required(required);
        Ok(())
    }

    fn on_fully_connected(&mut self, origin: Origin) -> Result<(), SessionError> {
        let sender = match origin {
            Origin::Local => {
                self.local_machine.mark_fully_connected();
                debug!("local machine fully connected");
                return Ok(());
            }
            Origin::Remote(sender) => sender,
        };

        let Some(machine) = self.machines.get_mut(&sender) else {
            return Ok(());
        };
        if machine.is_fully_connected() {
            // Duplicate: our own fully-connected ack crossing theirs.
            return Ok(());
        }
        machine.mark_fully_connected();
        debug!(%sender, "peer fully connected");

        if self.local_machine.is_fully_connected() {
            // Ack our own state first so the peer trusts the roster sync
            // that follows, then introduce every local gamer to it.
            self.send_control_to_remote(&SessionMessage::FullyConnected, sender);
            let roster: Vec<SessionMessage> = self
                .local_machine
                .gamers()
                .iter()
                .filter_map(|id| self.gamers.get(id))
                .map(gamer_joined_message)
                .collect();
            for msg in roster {
                self.send_control_to_remote(&msg, sender);
            }
        }
        Ok(())
    }

    fn on_gamer_join_request(&mut self, origin: Origin) -> Result<(), SessionError> {
        if !self.is_host {
            if let Origin::Remote(sender) = origin {
                warn!(%sender, "ignoring gamer join request sent to a non-host");
            }
            return Ok(());
        }

        match origin {
            Origin::Remote(sender) => {
                let fully_connected = self
                    .machines
                    .get(&sender)
                    .is_some_and(Machine::is_fully_connected);
                if !fully_connected {
                    self.kick(sender, "gamer join request before handshake completed");
                    return Ok(());
                }
                let assigned = self.allocate_gamer_id();
                if assigned.is_none() {
                    warn!(%sender, "denying gamer join request, session at capacity");
                }
                self.send_control_to_remote(&SessionMessage::GamerJoinResponse { assigned }, sender);
                Ok(())
            }
            Origin::Local => {
                let assigned = self.allocate_gamer_id();
                self.trigger(SessionMessage::GamerJoinResponse { assigned }, Origin::Local)
            }
        }
    }

    fn on_gamer_join_response(
        &mut self,
        assigned: Option<GamerId>,
        origin: Origin,
    ) -> Result<(), SessionError> {
        if let Origin::Remote(sender) = origin {
            if Some(sender) != self.host_endpoint {
                self.kick(sender, "gamer join response from a non-host machine");
                return Ok(());
            }
        }

        if self.pending_identities.is_empty() {
            warn!("gamer join response with no pending identity");
            return Ok(());
        }
        let Some(id) = assigned else {
            let identity = self.pending_identities.pop_front();
            warn!(
                gamertag = identity.as_ref().map(|i| i.gamertag.as_str()),
                "host denied gamer join request"
            );
            return Ok(());
        };

        let identity = match self.pending_identities.pop_front() {
            Some(identity) => identity,
            None => return Ok(()),
        };
        // The first approved local identity becomes the host gamer when
        // this machine hosts.
        let is_first = self.local_machine.gamers().is_empty();
        let gamer = Gamer::new_local(id, identity, !is_first, self.is_host && is_first);
        self.send_control_to_everyone(gamer_joined_message(&gamer))
    }

    #[expect(clippy::too_many_arguments)]
    fn on_gamer_joined(
        &mut self,
        display_name: String,
        gamertag: String,
        id: GamerId,
        is_guest: bool,
        is_host: bool,
        is_private_slot: bool,
        origin: Origin,
    ) -> Result<(), SessionError> {
        match origin {
            Origin::Local => {
                let gamer = Gamer::new_local(
                    id,
                    PlayerIdentity::with_display_name(gamertag, display_name),
                    is_guest,
                    is_host,
                );
                self.local_machine.add_gamer(id);
                self.insert_gamer(gamer);
            }
            Origin::Remote(sender) => {
                if self.is_host && is_host {
                    // A remote gamer claiming host status while we host.
                    self.kick(sender, "host impersonation in gamer joined");
                    return Ok(());
                }
                if self.gamers.contains_key(&id) {
                    self.kick(sender, "gamer id collision in gamer joined");
                    return Ok(());
                }
                let fully_connected = self
                    .machines
                    .get(&sender)
                    .is_some_and(Machine::is_fully_connected);
                if !fully_connected {
                    self.kick(sender, "gamer joined before handshake completed");
                    return Ok(());
                }

                let gamer = Gamer::new_remote(
                    id,
                    gamertag,
                    display_name,
                    is_guest,
                    is_host,
                    is_private_slot,
                    sender,
                );
                if let Some(machine) = self.machines.get_mut(&sender) {
                    machine.add_gamer(id);
                }
                self.insert_gamer(gamer);
            }
        }
        Ok(())
    }

    fn on_gamer_left(&mut self, id: GamerId, origin: Origin) -> Result<(), SessionError> {
        let Origin::Remote(sender) = origin else {
            // Local departures are handled directly by teardown.
            return Ok(());
        };
        let Some(gamer) = self.gamers.get(&id) else {
            warn!(%sender, %id, "gamer left message for unknown gamer");
            return Ok(());
        };
        if gamer.machine() != MachineKey::Remote(sender) {
            self.kick(sender, "gamer left message for a gamer it does not own");
            return Ok(());
        }
        self.remove_gamer(id);
        Ok(())
    }

    fn on_user_message(
        &mut self,
        sender_id: GamerId,
        recipient: Option<GamerId>,
        payload: &[u8],
        _origin: Origin,
    ) -> Result<(), SessionError> {
        let sender = self.gamers.contains_key(&sender_id).then_some(sender_id);
        match recipient {
            None => {
                // Broadcast: every local gamer except the sender itself.
                let local_ids: Vec<GamerId> = self.local_machine.gamers().to_vec();
                for id in local_ids {
                    if id == sender_id {
                        continue;
                    }
                    self.deliver(id, payload, sender);
                }
            }
            Some(recipient_id) => {
                let is_local = self
                    .gamers
                    .get(&recipient_id)
                    .is_some_and(Gamer::is_local);
                if is_local {
                    self.deliver(recipient_id, payload, sender);
                } else {
                    warn!(%recipient_id, "user message addressed to a gamer not on this machine");
                }
            }
        }
        Ok(())
    }

    /// Copy a payload into a pooled packet on a local gamer's inbound queue.
    fn deliver(&mut self, recipient: GamerId, payload: &[u8], sender: Option<GamerId>) {
        let mut packet = self.packet_pool.get(payload.len());
        packet.payload_mut().copy_from_slice(payload);
        if let Some(gamer) = self.gamers.get_mut(&recipient) {
            gamer.push_inbound(InboundPacket { packet, sender });
        } else {
            self.packet_pool.recycle(packet);
        }
    }

    // ------------------------------------------------------------------
    // Send helpers
    // ------------------------------------------------------------------

    fn send_control_to_remote(&mut self, msg: &SessionMessage, peer: EndPoint) {
        trace!(kind = msg.kind(), %peer, "sending control message");
        self.transport.send(
            &msg.encode(),
            SendTarget::Peer(peer),
            DeliveryMode::ReliableOrdered,
            CHANNEL_CONTROL,
        );
    }

    /// Send a control message to the host, or trigger it locally when this
    /// machine is the host.
    fn send_control_to_host(&mut self, msg: SessionMessage) -> Result<(), SessionError> {
        match self.host_endpoint {
            Some(peer) => {
                self.send_control_to_remote(&msg, peer);
                Ok(())
            }
            None => self.trigger(msg, Origin::Local),
        }
    }

    /// Broadcast to every peer, then trigger locally so this machine
    /// observes the same message.
    fn send_control_to_everyone(&mut self, msg: SessionMessage) -> Result<(), SessionError> {
        trace!(kind = msg.kind(), "sending control message to everyone");
        if !self.machines.is_empty() {
            self.transport.send(
                &msg.encode(),
                SendTarget::AllPeers,
                DeliveryMode::ReliableOrdered,
                CHANNEL_CONTROL,
            );
        }
        self.trigger(msg, Origin::Local)
    }

    /// Broadcast to every peer without the local trigger.
    fn send_control_to_peers_only(&mut self, msg: &SessionMessage) {
        if !self.machines.is_empty() {
            self.transport.send(
                &msg.encode(),
                SendTarget::AllPeers,
                DeliveryMode::ReliableOrdered,
                CHANNEL_CONTROL,
            );
        }
    }

    fn send_user_to_everyone(
        &mut self,
        msg: SessionMessage,
        delivery: DeliveryMode,
    ) -> Result<(), SessionError> {
        if !self.machines.is_empty() {
            self.transport
                .send(&msg.encode(), SendTarget::AllPeers, delivery, CHANNEL_USER);
        }
        self.trigger(msg, Origin::Local)
    }

    // ------------------------------------------------------------------
    // Registry upkeep
    // ------------------------------------------------------------------

    fn insert_gamer(&mut self, gamer: Gamer) {
        let id = gamer.id;
        debug!(%id, gamertag = %gamer.gamertag, "gamer joined");
        self.gamers.insert(id, gamer);
        self.gamer_order.push(id);
        self.events.push_back(SessionEvent::GamerJoined { id });
    }

    fn remove_gamer(&mut self, id: GamerId) {
        let Some(mut gamer) = self.gamers.remove(&id) else {
            return;
        };
        debug!(%id, gamertag = %gamer.gamertag, "gamer left");
        self.gamer_order.retain(|g| *g != id);
        match gamer.machine() {
            MachineKey::Local => self.local_machine.remove_gamer(id),
            MachineKey::Remote(peer) => {
                if let Some(machine) = self.machines.get_mut(&peer) {
                    machine.remove_gamer(id);
                }
            }
        }
        for packet in gamer.drain_all_packets() {
            self.packet_pool.recycle(packet);
        }
        self.events.push_back(SessionEvent::GamerLeft {
            id,
            gamertag: gamer.gamertag,
        });
    }

    /// Forget a machine and everything it owned. Handles both graceful
    /// disconnects and kicks; on the host it also unsticks any handshake
    /// that was waiting on the vanished peer.
    fn drop_machine(&mut self, peer: EndPoint) {
        let Some(machine) = self.machines.remove(&peer) else {
            return;
        };
        for id in machine.gamers().to_vec() {
            self.remove_gamer(id);
        }

        if self.is_host {
            // Any still-pending machine that needed the vanished peer gets
            // a shrunken roster so its handshake cannot stall.
            let stalled: Vec<EndPoint> = self
                .machines
                .iter_mut()
                .filter_map(|(end_point, m)| m.remove_required(peer).then_some(*end_point))
                .collect();
            for end_point in stalled {
                let required = self
                    .machines
                    .get(&end_point)
                    .and_then(Machine::required)
                    .cloned()
                    .unwrap_or_default();
                debug!(peer = %end_point, "resending shrunken connection roster");
                self.send_control_to_remote(
                    &SessionMessage::ConnectToAllRequest {
                        end_points: required.into_iter().collect(),
                    },
                    end_point,
                );
            }
        } else if Some(peer) == self.host_endpoint && !self.disposed {
            warn!("lost connection to host, ending session");
            self.teardown(EndReason::HostDisconnected);
        }
    }

    /// Disconnect a misbehaving machine. Protocol violations are flagged
    /// and the offender removed; the session itself keeps running.
    fn kick(&mut self, peer: EndPoint, reason: &str) {
        warn!(%peer, reason, "removing machine from session");
        self.transport.disconnect(peer, reason);
        self.drop_machine(peer);
    }

    fn allocate_gamer_id(&mut self) -> Option<GamerId> {
        if self.gamers.len() as i32 >= self.max_gamers {
            return None;
        }
        if self.next_gamer_id > u16::from(GamerId::MAX_ASSIGNABLE) {
            return None;
        }
        #[expect(clippy::cast_possible_truncation)]
        let id = GamerId(self.next_gamer_id as u8);
        self.next_gamer_id += 1;
        Some(id)
    }

    fn build_advert(&self) -> SessionAdvert {
        let host_gamertag = self
            .local_machine
            .gamers()
            .first()
            .and_then(|id| self.gamers.get(id))
            .map_or_else(|| "Game starting up...".into(), |g| g.gamertag.clone());
        let current = self.gamers.len() as i32;
        SessionAdvert {
            kind: self.kind,
            max_gamers: self.max_gamers,
            private_slots: self.private_slots,
            current_gamer_count: current,
            host_gamertag,
            open_private_slots: self.private_slots,
            open_public_slots: self.max_gamers - self.private_slots - current,
            properties: self.properties.clone(),
        }
    }

    /// Remove local gamers (newest first), announce their departure, shut
    /// the transport down, and fire the end event.
    fn teardown(&mut self, reason: EndReason) {
        if self.disposed {
            return;
        }
        let local_ids: Vec<GamerId> = self.local_machine.gamers().to_vec();
        for id in local_ids.into_iter().rev() {
            self.send_control_to_peers_only(&SessionMessage::GamerLeft { id });
            self.remove_gamer(id);
        }
        self.transport.shutdown(match reason {
            EndReason::Disposed => "session disposed",
            EndReason::HostDisconnected => "host disconnected",
        });
        self.events.push_back(SessionEvent::SessionEnded { reason });
        self.disposed = true;
    }

    // ------------------------------------------------------------------
    // Public API
    // ------------------------------------------------------------------

    /// End the session: every local gamer leaves (newest first) and the
    /// transport endpoint shuts down. Events raised by the teardown remain
    /// drainable afterwards.
    pub fn dispose(&mut self) {
        self.teardown(EndReason::Disposed);
    }

    /// Queue another local identity for admission. When the handshake is
    /// already complete the join request goes out immediately; otherwise it
    /// is sent the moment the machine becomes fully connected.
    pub fn add_local_gamer(&mut self, identity: PlayerIdentity) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        self.pending_identities.push_back(identity);
        if self.local_machine.is_fully_connected() {
            self.send_control_to_host(SessionMessage::GamerJoinRequest)?;
        }
        Ok(())
    }

    /// Queue an application payload from a local gamer. `recipient` of
    /// `None` broadcasts to every gamer (except the sender itself). Flushed
    /// on the next `update()`.
    pub fn send_data(
        &mut self,
        sender: GamerId,
        data: &[u8],
        delivery: DeliveryMode,
        recipient: Option<GamerId>,
    ) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        if !self.gamers.get(&sender).is_some_and(Gamer::is_local) {
            return Err(SessionError::NoSuchLocalGamer(sender));
        }
        let mut packet = self.packet_pool.get(data.len());
        packet.payload_mut().copy_from_slice(data);
        if let Some(gamer) = self.gamers.get_mut(&sender) {
            gamer.push_outbound(OutboundPacket {
                packet,
                recipient,
                delivery,
            });
        }
        Ok(())
    }

    /// Pop the next inbound packet for a local gamer into `buf`. Returns
    /// `None` when the queue is empty. The underlying buffer is recycled on
    /// the next `update()`.
    pub fn receive_data(
        &mut self,
        receiver: GamerId,
        buf: &mut Vec<u8>,
    ) -> Result<Option<Received>, SessionError> {
        let Some(gamer) = self.gamers.get_mut(&receiver).filter(|g| g.is_local()) else {
            return Err(SessionError::NoSuchLocalGamer(receiver));
        };
        let Some(inbound) = gamer.pop_inbound() else {
            return Ok(None);
        };
        buf.clear();
        buf.extend_from_slice(inbound.packet.payload());
        let received = Received {
            sender: inbound.sender,
            len: inbound.packet.len(),
        };
        gamer.push_consumed(inbound.packet);
        Ok(Some(received))
    }

    /// Host-only. Not implemented at this revision.
    pub fn start_game(&mut self) -> Result<(), SessionError> {
        if !self.is_host {
            return Err(SessionError::HostOnly("start_game"));
        }
        Err(SessionError::NotImplemented("start_game"))
    }

    /// Host-only. Not implemented at this revision.
    pub fn end_game(&mut self) -> Result<(), SessionError> {
        if !self.is_host {
            return Err(SessionError::HostOnly("end_game"));
        }
        Err(SessionError::NotImplemented("end_game"))
    }

    /// Host-only. Not implemented at this revision.
    pub fn reset_ready(&mut self) -> Result<(), SessionError> {
        if !self.is_host {
            return Err(SessionError::HostOnly("reset_ready"));
        }
        Err(SessionError::NotImplemented("reset_ready"))
    }

    /// Drain all pending lifecycle events.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    pub fn find_gamer_by_id(&self, id: GamerId) -> Option<&Gamer> {
        self.gamers.get(&id)
    }

    /// Mark a local gamer ready. Readiness is local state at this revision;
    /// it is not synchronized to other machines.
    pub fn set_ready(&mut self, id: GamerId, ready: bool) -> Result<(), SessionError> {
        match self.gamers.get_mut(&id).filter(|g| g.is_local()) {
            Some(gamer) => {
                gamer.is_ready = ready;
                Ok(())
            }
            None => Err(SessionError::NoSuchLocalGamer(id)),
        }
    }

    /// Every gamer in join order.
    pub fn all_gamers(&self) -> impl Iterator<Item = &Gamer> {
        self.gamer_order
            .iter()
            .filter_map(|id| self.gamers.get(id))
    }

    pub fn local_gamers(&self) -> impl Iterator<Item = &Gamer> {
        self.all_gamers().filter(|g| g.is_local())
    }

    pub fn remote_gamers(&self) -> impl Iterator<Item = &Gamer> {
        self.all_gamers().filter(|g| !g.is_local())
    }

    /// The host machine's first gamer, once it exists.
    pub fn host_gamer(&self) -> Option<&Gamer> {
        let machine = if self.is_host {
            &self.local_machine
        } else {
            self.machines.get(&self.host_endpoint?)?
        };
        machine.gamers().first().and_then(|id| self.gamers.get(id))
    }

    pub fn is_everyone_ready(&self) -> bool {
        self.all_gamers().all(|g| g.is_ready)
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn session_kind(&self) -> SessionKind {
        self.kind
    }

    pub fn session_state(&self) -> SessionState {
        self.state
    }

    pub fn max_gamers(&self) -> i32 {
        self.max_gamers
    }

    pub fn private_gamer_slots(&self) -> i32 {
        self.private_slots
    }

    pub fn current_gamer_count(&self) -> usize {
        self.gamers.len()
    }

    #[cfg(test)]
    fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Build the announcement for a gamer joining the session.
fn gamer_joined_message(gamer: &Gamer) -> SessionMessage {
    SessionMessage::GamerJoined {
        display_name: gamer.display_name.clone(),
        gamertag: gamer.gamertag.clone(),
        id: gamer.id,
        is_guest: gamer.is_guest,
        is_host: gamer.is_host,
        is_private_slot: gamer.is_private_slot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal transport for orchestrator unit tests: connects succeed
    /// instantly, events are pushed by the test, sends are recorded. Full
    /// multi-session flows live in the `netplay_tests` crate.
    #[derive(Debug)]
    struct StubTransport {
        endpoint: EndPoint,
        refuse_connections: bool,
        connected: BTreeSet<EndPoint>,
        events: VecDeque<TransportEvent>,
        sent: Vec<(SendTarget, Vec<u8>)>,
        discovery_answers: Vec<(EndPoint, Vec<u8>)>,
        shut_down: bool,
    }

    impl StubTransport {
        fn new() -> Self {
            Self {
                endpoint: "127.0.0.1:14242".parse().unwrap(),
                refuse_connections: false,
                connected: BTreeSet::new(),
                events: VecDeque::new(),
                sent: Vec::new(),
                discovery_answers: Vec::new(),
                shut_down: false,
            }
        }

        fn push_event(&mut self, event: TransportEvent) {
            self.events.push_back(event);
        }

        fn sent_kinds(&self) -> Vec<u8> {
            self.sent.iter().map(|(_, bytes)| bytes[0]).collect()
        }
    }

    impl Transport for StubTransport {
        fn local_endpoint(&self) -> EndPoint {
            self.endpoint
        }

        fn connect(&mut self, peer: EndPoint) {
            if !self.refuse_connections {
                self.connected.insert(peer);
            }
        }

        fn disconnect(&mut self, peer: EndPoint, _reason: &str) {
            self.connected.remove(&peer);
        }

        fn is_connected(&self, peer: EndPoint) -> bool {
            self.connected.contains(&peer)
        }

        fn connected_peers(&self) -> Vec<EndPoint> {
            self.connected.iter().copied().collect()
        }

        fn send(&mut self, payload: &[u8], target: SendTarget, _d: DeliveryMode, _c: u8) {
            self.sent.push((target, payload.to_vec()));
        }

        fn poll_event(&mut self) -> Option<TransportEvent> {
            self.events.pop_front()
        }

        fn discover(&mut self, _port: u16) {}

        fn respond_discovery(&mut self, payload: &[u8], target: EndPoint) {
            self.discovery_answers.push((target, payload.to_vec()));
        }

        fn shutdown(&mut self, _reason: &str) {
            self.shut_down = true;
            self.connected.clear();
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            discovery_window: Duration::ZERO,
            join_window: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    fn host_ep() -> EndPoint {
        "10.0.0.1:14242".parse().unwrap()
    }

    fn sample_advert(current: i32, max: i32) -> SessionAdvert {
        SessionAdvert {
            kind: SessionKind::SystemLink,
            max_gamers: max,
            private_slots: 0,
            current_gamer_count: current,
            host_gamertag: "Host".into(),
            open_private_slots: 0,
            open_public_slots: max - current,
            properties: SessionProperties::default(),
        }
    }

    fn available(current: i32, max: i32) -> AvailableSession {
        AvailableSession {
            host_endpoint: host_ep(),
            advert: sample_advert(current, max),
        }
    }

    #[test]
    fn create_rejects_out_of_range_max_gamers() {
        for bad in [1, 0, 65, -3] {
            let config = SessionConfig {
                max_gamers: bad,
                ..fast_config()
            };
            let err = Session::create(StubTransport::new(), vec![], &config).unwrap_err();
            assert_eq!(err, SessionError::MaxGamersOutOfRange(bad));
        }
    }

    #[test]
    fn create_rejects_out_of_range_private_slots() {
        for bad in [-1, 9] {
            let config = SessionConfig {
                max_gamers: 8,
                private_slots: bad,
                ..fast_config()
            };
            let err = Session::create(StubTransport::new(), vec![], &config).unwrap_err();
            assert_eq!(err, SessionError::PrivateSlotsOutOfRange(bad));
        }
    }

    #[test]
    fn create_starts_with_empty_roster() {
        let session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("Host")],
            &fast_config(),
        )
        .unwrap();
        assert_eq!(session.all_gamers().count(), 0);
        assert!(session.is_host());
    }

    #[test]
    fn find_rejects_local_kind() {
        let err = Session::find(
            StubTransport::new(),
            SessionKind::Local,
            &SessionProperties::default(),
            &fast_config(),
        )
        .unwrap_err();
        assert_eq!(err, SessionError::UnsupportedSessionKind(SessionKind::Local));
    }

    #[test]
    fn join_fails_without_connection() {
        let mut transport = StubTransport::new();
        transport.refuse_connections = true;
        let err = Session::join(transport, &available(1, 4), vec![], &fast_config()).unwrap_err();
        assert_eq!(err, SessionError::Join(JoinError::SessionNotFound));
    }

    #[test]
    fn join_rejects_full_session() {
        let err =
            Session::join(StubTransport::new(), &available(4, 4), vec![], &fast_config())
                .unwrap_err();
        assert_eq!(err, SessionError::Join(JoinError::SessionFull));
    }

    #[test]
    fn host_first_update_admits_host_gamer_with_id_zero() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("Ember")],
            &fast_config(),
        )
        .unwrap();

        session.update().unwrap();

        assert_eq!(session.all_gamers().count(), 1);
        let gamer = session.find_gamer_by_id(GamerId(0)).unwrap();
        assert_eq!(gamer.gamertag, "Ember");
        assert!(gamer.is_host);
        assert!(!gamer.is_guest);
        assert_eq!(session.host_gamer().unwrap().id, GamerId(0));
        assert_eq!(
            session.poll_events(),
            vec![SessionEvent::GamerJoined { id: GamerId(0) }]
        );

        // A second update must not re-run the handshake or admit anyone.
        session.update().unwrap();
        assert_eq!(session.all_gamers().count(), 1);
        assert!(session.poll_events().is_empty());
    }

    #[test]
    fn additional_identities_become_guests_with_distinct_ids() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("Ember"), PlayerIdentity::new("Moss")],
            &fast_config(),
        )
        .unwrap();
        session.update().unwrap();

        assert_eq!(session.all_gamers().count(), 2);
        let second = session.find_gamer_by_id(GamerId(1)).unwrap();
        assert_eq!(second.gamertag, "Moss");
        assert!(second.is_guest);
        assert!(!second.is_host);
    }

    #[test]
    fn add_local_gamer_after_create_requests_next_id() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("Ember")],
            &fast_config(),
        )
        .unwrap();
        session.update().unwrap();

        session
            .add_local_gamer(PlayerIdentity::new("Fern"))
            .unwrap();
        assert_eq!(session.all_gamers().count(), 2);
        let fern = session.find_gamer_by_id(GamerId(1)).unwrap();
        assert_eq!(fern.gamertag, "Fern");
        assert!(fern.is_guest);
    }

    #[test]
    fn gamer_id_counter_exhausts_at_255_allocations() {
        let config = SessionConfig {
            max_gamers: MAX_SUPPORTED_GAMERS,
            ..fast_config()
        };
        let mut session = Session::create(StubTransport::new(), vec![], &config).unwrap();

        for expected in 0..=u16::from(GamerId::MAX_ASSIGNABLE) {
            let id = session.allocate_gamer_id().unwrap();
            assert_eq!(u16::from(id.0), expected);
        }
        // The 256th request is denied, never wrapped around.
        assert_eq!(session.allocate_gamer_id(), None);
        assert_eq!(session.allocate_gamer_id(), None);
    }

    #[test]
    fn allocation_denied_when_roster_full() {
        let config = SessionConfig {
            max_gamers: 2,
            ..fast_config()
        };
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("A"), PlayerIdentity::new("B")],
            &config,
        )
        .unwrap();
        session.update().unwrap();
        assert_eq!(session.all_gamers().count(), 2);
        assert_eq!(session.allocate_gamer_id(), None);
    }

    #[test]
    fn game_flow_calls_are_stubs() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("Ember")],
            &fast_config(),
        )
        .unwrap();
        assert_eq!(
            session.start_game(),
            Err(SessionError::NotImplemented("start_game"))
        );
        assert_eq!(
            session.end_game(),
            Err(SessionError::NotImplemented("end_game"))
        );
        assert_eq!(
            session.reset_ready(),
            Err(SessionError::NotImplemented("reset_ready"))
        );
        assert_eq!(session.session_state(), SessionState::Lobby);
    }

    #[test]
    fn dispose_removes_local_gamers_in_reverse_add_order() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("Ember"), PlayerIdentity::new("Moss")],
            &fast_config(),
        )
        .unwrap();
        session.update().unwrap();
        let _ = session.poll_events();

        session.dispose();
        assert!(session.is_disposed());
        assert_eq!(
            session.poll_events(),
            vec![
                SessionEvent::GamerLeft {
                    id: GamerId(1),
                    gamertag: "Moss".into()
                },
                SessionEvent::GamerLeft {
                    id: GamerId(0),
                    gamertag: "Ember".into()
                },
                SessionEvent::SessionEnded {
                    reason: EndReason::Disposed
                },
            ]
        );
        assert!(session.transport_mut().shut_down);
        assert_eq!(session.update(), Err(SessionError::Disposed));
    }

    #[test]
    fn broadcast_reaches_every_other_local_gamer_exactly_once() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![
                PlayerIdentity::new("A"),
                PlayerIdentity::new("B"),
                PlayerIdentity::new("C"),
            ],
            &fast_config(),
        )
        .unwrap();
        session.update().unwrap();

        session
            .send_data(GamerId(0), b"hello", DeliveryMode::ReliableOrdered, None)
            .unwrap();
        session.update().unwrap();

        // Sender's own queue stays empty; both others got exactly one copy.
        assert_eq!(session.find_gamer_by_id(GamerId(0)).unwrap().inbound_count(), 0);
        assert_eq!(session.find_gamer_by_id(GamerId(1)).unwrap().inbound_count(), 1);
        assert_eq!(session.find_gamer_by_id(GamerId(2)).unwrap().inbound_count(), 1);

        let mut buf = Vec::new();
        let received = session.receive_data(GamerId(1), &mut buf).unwrap().unwrap();
        assert_eq!(buf, b"hello");
        assert_eq!(received.sender, Some(GamerId(0)));
        assert_eq!(received.len, 5);
    }

    #[test]
    fn targeted_send_to_local_gamer_loops_back() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("A"), PlayerIdentity::new("B")],
            &fast_config(),
        )
        .unwrap();
        session.update().unwrap();

        session
            .send_data(
                GamerId(0),
                &[9, 9, 9],
                DeliveryMode::Reliable,
                Some(GamerId(1)),
            )
            .unwrap();
        session.update().unwrap();

        let mut buf = Vec::new();
        let received = session.receive_data(GamerId(1), &mut buf).unwrap().unwrap();
        assert_eq!(buf, [9, 9, 9]);
        assert_eq!(received.sender, Some(GamerId(0)));
        assert!(session.receive_data(GamerId(1), &mut buf).unwrap().is_none());
    }

    #[test]
    fn send_data_rejects_unknown_or_remote_sender() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("A")],
            &fast_config(),
        )
        .unwrap();
        session.update().unwrap();
        let err = session
            .send_data(GamerId(9), b"x", DeliveryMode::Unreliable, None)
            .unwrap_err();
        assert_eq!(err, SessionError::NoSuchLocalGamer(GamerId(9)));
    }

    #[test]
    fn consumed_packets_recycle_on_next_update() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("A"), PlayerIdentity::new("B")],
            &fast_config(),
        )
        .unwrap();
        session.update().unwrap();

        session
            .send_data(GamerId(0), b"abc", DeliveryMode::Reliable, Some(GamerId(1)))
            .unwrap();
        session.update().unwrap();

        let mut buf = Vec::new();
        session.receive_data(GamerId(1), &mut buf).unwrap().unwrap();
        let free_before = session.packet_pool.free_count();
        session.update().unwrap();
        assert!(session.packet_pool.free_count() > free_before);
    }

    #[test]
    fn data_from_unknown_peer_is_a_transport_fault() {
        let mut session = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("A")],
            &fast_config(),
        )
        .unwrap();
        session.update().unwrap();

        session
            .transport_mut()
            .push_event(TransportEvent::Data {
                sender: "10.9.9.9:1000".parse().unwrap(),
                payload: SessionMessage::FullyConnected.encode(),
            });
        let err = session.update().unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
    }

    #[test]
    fn joiner_handshake_approves_pending_identity() {
        // Drive a joiner session by hand, playing the host's side through
        // injected transport events.
        let mut transport = StubTransport::new();
        transport.connect(host_ep());
        transport.push_event(TransportEvent::Connected { peer: host_ep() });
        let mut session = Session::join(
            transport,
            &available(1, 4),
            vec![PlayerIdentity::new("Joiner")],
            &fast_config(),
        )
        .unwrap();
        assert!(!session.is_host());

        // Host sends an empty roster: no other peers to mesh with.
        session.transport_mut().push_event(TransportEvent::Data {
            sender: host_ep(),
            payload: SessionMessage::ConnectToAllRequest { end_points: vec![] }.encode(),
        });
        session.update().unwrap();

        // The machine went fully connected and asked the host for an ID.
        let expected = vec![
            SessionMessage::FullyConnected.kind(),
            SessionMessage::GamerJoinRequest.kind(),
        ];
        assert_eq!(session.transport_mut().sent_kinds(), expected);

        // Fully-connected is broadcast exactly once: further updates stay
        // quiet until the host answers.
        session.update().unwrap();
        assert_eq!(session.transport_mut().sent_kinds(), expected);

        // Host approves with id 1; the joiner announces its gamer.
        session.transport_mut().push_event(TransportEvent::Data {
            sender: host_ep(),
            payload: SessionMessage::GamerJoinResponse {
                assigned: Some(GamerId(1)),
            }
            .encode(),
        });
        session.update().unwrap();

        assert_eq!(session.all_gamers().count(), 1);
        let gamer = session.find_gamer_by_id(GamerId(1)).unwrap();
        assert_eq!(gamer.gamertag, "Joiner");
        assert!(!gamer.is_host);
        assert!(!gamer.is_guest);
    }

    #[test]
    fn host_disconnect_tears_down_joiner_session() {
        let mut transport = StubTransport::new();
        transport.connect(host_ep());
        transport.push_event(TransportEvent::Connected { peer: host_ep() });
        let mut session =
            Session::join(transport, &available(1, 4), vec![], &fast_config()).unwrap();
        session.update().unwrap();

        session
            .transport_mut()
            .push_event(TransportEvent::Disconnected { peer: host_ep() });
        session.update().unwrap();

        assert!(session.is_disposed());
        assert_eq!(
            session.poll_events(),
            vec![SessionEvent::SessionEnded {
                reason: EndReason::HostDisconnected
            }]
        );
    }

    #[test]
    fn connect_to_all_from_non_host_kicks_sender() {
        let mut transport = StubTransport::new();
        transport.connect(host_ep());
        transport.push_event(TransportEvent::Connected { peer: host_ep() });
        let rogue: EndPoint = "10.0.0.66:14242".parse().unwrap();
        transport.push_event(TransportEvent::Connected { peer: rogue });
        let mut session =
            Session::join(transport, &available(1, 4), vec![], &fast_config()).unwrap();
        session.update().unwrap();

        session.transport_mut().push_event(TransportEvent::Data {
            sender: rogue,
            payload: SessionMessage::ConnectToAllRequest { end_points: vec![] }.encode(),
        });
        session.update().unwrap();

        // The rogue machine is gone; the host machine survives.
        assert!(!session.transport_mut().is_connected(rogue));
        assert!(!session.is_disposed());
    }

    #[test]
    fn discovery_request_answered_by_host_only() {
        let mut host = Session::create(
            StubTransport::new(),
            vec![PlayerIdentity::new("Ember")],
            &fast_config(),
        )
        .unwrap();
        host.update().unwrap();

        let searcher: EndPoint = "10.0.0.50:5000".parse().unwrap();
        host.transport_mut()
            .push_event(TransportEvent::DiscoveryRequest { sender: searcher });
        host.update().unwrap();

        let answers = host.transport_mut().discovery_answers.clone();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].0, searcher);
        let advert = SessionAdvert::from_bytes(&answers[0].1).unwrap();
        assert_eq!(advert.current_gamer_count, 1);
        assert_eq!(advert.host_gamertag, "Ember");
        assert_eq!(advert.open_public_slots, 7);

        // A joiner never answers discovery.
        let mut transport = StubTransport::new();
        transport.connect(host_ep());
        transport.push_event(TransportEvent::Connected { peer: host_ep() });
        let mut joiner =
            Session::join(transport, &available(1, 4), vec![], &fast_config()).unwrap();
        joiner
            .transport_mut()
            .push_event(TransportEvent::DiscoveryRequest { sender: searcher });
        joiner.update().unwrap();
        assert!(joiner.transport_mut().discovery_answers.is_empty());
    }
}
