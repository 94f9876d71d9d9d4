// Transport collaborator contract.
//
// The session core never touches a socket. It consumes a `Transport` — an
// unreliable/reliable peer-to-peer messaging primitive that frames outgoing
// datagrams, surfaces connection lifecycle changes as events, and answers
// local-network discovery broadcasts. Production builds plug in a real UDP
// peer; tests plug in the deterministic in-memory hub from `netplay_tests`.
//
// The transport may fill its inbound queue from background threads, but the
// session drains events only from inside `Session::update()`, so the core
// itself needs no locking.

use std::net::SocketAddr;

use foxfire_protocol::DeliveryMode;

/// A transport-level peer address.
pub type EndPoint = SocketAddr;

/// Destination of one outgoing send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendTarget {
    /// One connected peer.
    Peer(EndPoint),
    /// Every currently connected peer.
    AllPeers,
}

/// One inbound transport event, drained once per update tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection to `peer` is now live (either side may have initiated).
    Connected { peer: EndPoint },
    /// The connection to `peer` is gone.
    Disconnected { peer: EndPoint },
    /// A framed datagram from a connected peer.
    Data { sender: EndPoint, payload: Vec<u8> },
    /// A searcher on the local subnet asked who is hosting.
    DiscoveryRequest { sender: EndPoint },
    /// A host answered our discovery broadcast.
    DiscoveryResponse { sender: EndPoint, payload: Vec<u8> },
}

/// The peer-to-peer messaging primitive the session is built on.
///
/// Delivery guarantees are per `(peer, channel)` pair: `ReliableOrdered` and
/// `Sequenced` sends on one channel arrive in send order relative to each
/// other; nothing is guaranteed across channels or across senders.
pub trait Transport {
    /// The address this endpoint is reachable at.
    fn local_endpoint(&self) -> EndPoint;

    /// Begin connecting to a peer. Completion is reported through a
    /// `Connected` event; failures surface as the absence of one.
    fn connect(&mut self, peer: EndPoint);

    /// Drop the connection to a peer. The far side observes a
    /// `Disconnected` event carrying no reason payload; `reason` is local
    /// diagnostics only.
    fn disconnect(&mut self, peer: EndPoint, reason: &str);

    /// True when a live connection to `peer` exists right now.
    fn is_connected(&self, peer: EndPoint) -> bool;

    /// Every peer with a live connection, in unspecified order.
    fn connected_peers(&self) -> Vec<EndPoint>;

    /// Queue one framed datagram for delivery.
    fn send(&mut self, payload: &[u8], target: SendTarget, delivery: DeliveryMode, channel: u8);

    /// Pop the next queued inbound event, if any.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// Broadcast a discovery request to the local subnet on `port`.
    fn discover(&mut self, port: u16);

    /// Answer a discovery request with an advert payload.
    fn respond_discovery(&mut self, payload: &[u8], target: EndPoint);

    /// Tear the endpoint down; all connections drop.
    fn shutdown(&mut self, reason: &str);
}
