// In-memory transport hub for multiplayer integration tests.
//
// `MemoryHub` implements the session crate's `Transport` contract over
// shared in-process queues: connects complete synchronously, delivery is
// perfect and ordered, and discovery reaches every endpoint listening on
// the broadcast port. That determinism lets the integration tests drive
// real `Session` values through the full protocol — handshake, join
// approval, user messages, teardown — with no sockets and no sleeps between
// update ticks.
//
// The one fault knob is `hold_connections`: connect attempts between a held
// pair are parked instead of completing, which is how the tests freeze a
// peer mid-handshake to exercise the host's stall recovery. Delivery modes
// are accepted and ignored — a perfect network satisfies every mode.
//
// Everything else (game flow, assertions) lives in `tests/`; the only
// test-specific code here is the transport itself plus the `pump_all`
// update-driving helper.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use foxfire_protocol::DeliveryMode;
use foxfire_session::{EndPoint, SendTarget, Session, Transport, TransportEvent};

#[derive(Default)]
struct PeerBox {
    inbox: VecDeque<TransportEvent>,
    connections: BTreeSet<EndPoint>,
    alive: bool,
}

#[derive(Default)]
struct HubState {
    peers: BTreeMap<EndPoint, PeerBox>,
    /// Endpoint pairs whose connect attempts are parked.
    held: BTreeSet<(EndPoint, EndPoint)>,
    /// Parked connect attempts, completed by `release_connections`.
    deferred: Vec<(EndPoint, EndPoint)>,
}

impl HubState {
    fn complete_connect(&mut self, a: EndPoint, b: EndPoint) {
        let Some(peer_b) = self.peers.get_mut(&b) else {
            return;
        };
        if !peer_b.alive {
            return;
        }
        peer_b.connections.insert(a);
        peer_b.inbox.push_back(TransportEvent::Connected { peer: a });

        let Some(peer_a) = self.peers.get_mut(&a) else {
            return;
        };
        peer_a.connections.insert(b);
        peer_a.inbox.push_back(TransportEvent::Connected { peer: b });
    }
}

/// A shared in-memory network connecting any number of `MemoryTransport`
/// endpoints.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new endpoint at `addr` (e.g. `"10.0.0.1:14242"`).
    /// Discovery broadcasts reach it when its port matches the broadcast
    /// port.
    pub fn endpoint(&self, addr: &str) -> MemoryTransport {
        let endpoint: EndPoint = addr.parse().expect("invalid endpoint address");
        let mut state = self.state.lock().unwrap();
        state.peers.insert(
            endpoint,
            PeerBox {
                alive: true,
                ..PeerBox::default()
            },
        );
        MemoryTransport {
            state: self.state.clone(),
            endpoint,
        }
    }

    /// Park all future connect attempts between `a` and `b` (either
    /// direction) until `release_connections` is called.
    pub fn hold_connections(&self, a: &str, b: &str) {
        let a: EndPoint = a.parse().expect("invalid endpoint address");
        let b: EndPoint = b.parse().expect("invalid endpoint address");
        let mut state = self.state.lock().unwrap();
        state.held.insert((a, b));
        state.held.insert((b, a));
    }

    /// Complete every parked connect attempt and stop holding.
    pub fn release_connections(&self) {
        let mut state = self.state.lock().unwrap();
        state.held.clear();
        let deferred = std::mem::take(&mut state.deferred);
        for (a, b) in deferred {
            state.complete_connect(a, b);
        }
    }
}

/// One endpoint on a `MemoryHub`.
pub struct MemoryTransport {
    state: Arc<Mutex<HubState>>,
    endpoint: EndPoint,
}

impl Transport for MemoryTransport {
    fn local_endpoint(&self) -> EndPoint {
        self.endpoint
    }

    fn connect(&mut self, peer: EndPoint) {
        if peer == self.endpoint {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.held.contains(&(self.endpoint, peer)) {
            state.deferred.push((self.endpoint, peer));
            return;
        }
        state.complete_connect(self.endpoint, peer);
    }

    fn disconnect(&mut self, peer: EndPoint, _reason: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(peer_box) = state.peers.get_mut(&peer) {
            if peer_box.connections.remove(&self.endpoint) {
                peer_box.inbox.push_back(TransportEvent::Disconnected {
                    peer: self.endpoint,
                });
            }
        }
        if let Some(own) = state.peers.get_mut(&self.endpoint) {
            if own.connections.remove(&peer) {
                own.inbox
                    .push_back(TransportEvent::Disconnected { peer });
            }
        }
    }

    fn is_connected(&self, peer: EndPoint) -> bool {
        let state = self.state.lock().unwrap();
        state
            .peers
            .get(&self.endpoint)
            .is_some_and(|own| own.connections.contains(&peer))
    }

    fn connected_peers(&self) -> Vec<EndPoint> {
        let state = self.state.lock().unwrap();
        state
            .peers
            .get(&self.endpoint)
            .map(|own| own.connections.iter().copied().collect())
            .unwrap_or_default()
    }

    fn send(&mut self, payload: &[u8], target: SendTarget, _delivery: DeliveryMode, _channel: u8) {
        let mut state = self.state.lock().unwrap();
        let targets: Vec<EndPoint> = match target {
            SendTarget::Peer(peer) => vec![peer],
            SendTarget::AllPeers => state
                .peers
                .get(&self.endpoint)
                .map(|own| own.connections.iter().copied().collect())
                .unwrap_or_default(),
        };
        for peer in targets {
            if let Some(peer_box) = state.peers.get_mut(&peer) {
                if peer_box.alive {
                    peer_box.inbox.push_back(TransportEvent::Data {
                        sender: self.endpoint,
                        payload: payload.to_vec(),
                    });
                }
            }
        }
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let mut state = self.state.lock().unwrap();
        state.peers.get_mut(&self.endpoint)?.inbox.pop_front()
    }

    fn discover(&mut self, port: u16) {
        let mut state = self.state.lock().unwrap();
        let listeners: Vec<EndPoint> = state
            .peers
            .iter()
            .filter(|(endpoint, peer_box)| {
                **endpoint != self.endpoint && peer_box.alive && endpoint.port() == port
            })
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for listener in listeners {
            if let Some(peer_box) = state.peers.get_mut(&listener) {
                peer_box.inbox.push_back(TransportEvent::DiscoveryRequest {
                    sender: self.endpoint,
                });
            }
        }
    }

    fn respond_discovery(&mut self, payload: &[u8], target: EndPoint) {
        let mut state = self.state.lock().unwrap();
        if let Some(peer_box) = state.peers.get_mut(&target) {
            if peer_box.alive {
                peer_box.inbox.push_back(TransportEvent::DiscoveryResponse {
                    sender: self.endpoint,
                    payload: payload.to_vec(),
                });
            }
        }
    }

    fn shutdown(&mut self, _reason: &str) {
        let mut state = self.state.lock().unwrap();
        let connections: Vec<EndPoint> = state
            .peers
            .get(&self.endpoint)
            .map(|own| own.connections.iter().copied().collect())
            .unwrap_or_default();
        for peer in connections {
            if let Some(peer_box) = state.peers.get_mut(&peer) {
                peer_box.connections.remove(&self.endpoint);
                peer_box.inbox.push_back(TransportEvent::Disconnected {
                    peer: self.endpoint,
                });
            }
        }
        if let Some(own) = state.peers.get_mut(&self.endpoint) {
            own.connections.clear();
            own.alive = false;
        }
    }
}

/// Run `rounds` update ticks across all sessions, interleaved, so messages
/// sent by one session during a round are processed by the others in the
/// same round's later ticks or the next round.
pub fn pump_all(sessions: &mut [&mut Session<MemoryTransport>], rounds: usize) {
    for _ in 0..rounds {
        for session in sessions.iter_mut() {
            session.update().expect("session update failed");
        }
    }
}
