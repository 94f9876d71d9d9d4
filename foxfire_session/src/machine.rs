// One participating process and its connection handshake state.
//
// Every machine walks an explicit state machine instead of the usual grab
// bag of "pending endpoint" collections:
//
//   Pending ──(connect-to-all roster arrives)──▶ Connecting { required }
//   Connecting ──(all required endpoints live)──▶ FullyConnected
//
// The local machine holds its own required set (seeded empty on the host, so
// the host is fully connected after its first update). For remote machines
// the host stores the snapshot it sent in the connect-to-all request, which
// is exactly the set it must shrink and resend when a referenced peer
// disconnects mid-handshake; non-hosts leave remote machines `Pending` until
// the peer's own fully-connected broadcast arrives.

use std::collections::BTreeSet;

use foxfire_protocol::GamerId;

use crate::transport::EndPoint;

/// Handshake progress for one machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection roster yet.
    Pending,
    /// Holds the endpoints this machine must be connected to before it
    /// counts as fully connected.
    Connecting { required: BTreeSet<EndPoint> },
    /// Handshake complete; protocol messages from this machine are trusted.
    FullyConnected,
}

/// One process participating in the session, local or remote.
#[derive(Debug)]
pub struct Machine {
    endpoint: Option<EndPoint>,
    is_host: bool,
    state: ConnectionState,
    gamers: Vec<GamerId>,
}

impl Machine {
    /// The machine representing this process. The host seeds an empty
    /// required set so it is approved on the first update; a joiner waits
    /// for the host's connect-to-all request.
    pub fn new_local(is_host: bool) -> Self {
        let state = if is_host {
            ConnectionState::Connecting {
                required: BTreeSet::new(),
            }
        } else {
            ConnectionState::Pending
        };
        Self {
            endpoint: None,
            is_host,
            state,
            gamers: Vec::new(),
        }
    }

    /// A machine reached over the transport.
    pub fn new_remote(endpoint: EndPoint, is_host: bool) -> Self {
        Self {
            endpoint: Some(endpoint),
            is_host,
            state: ConnectionState::Pending,
            gamers: Vec::new(),
        }
    }

    /// `None` for the local machine.
    pub fn endpoint(&self) -> Option<EndPoint> {
        self.endpoint
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_fully_connected(&self) -> bool {
        self.state == ConnectionState::FullyConnected
    }

    /// Install (or replace) the set of endpoints this machine must connect
    /// to. Replacing is how the host unsticks a handshake after one of the
    /// required peers disconnects.
    pub fn set_required(&mut self, required: BTreeSet<EndPoint>) {
        if self.state != ConnectionState::FullyConnected {
            self.state = ConnectionState::Connecting { required };
        }
    }

    /// Drop one endpoint from the required set. Returns true when the
    /// machine was still connecting and actually held it.
    pub fn remove_required(&mut self, end_point: EndPoint) -> bool {
        match &mut self.state {
            ConnectionState::Connecting { required } => required.remove(&end_point),
            _ => false,
        }
    }

    /// The remaining required set, while connecting.
    pub fn required(&self) -> Option<&BTreeSet<EndPoint>> {
        match &self.state {
            ConnectionState::Connecting { required } => Some(required),
            _ => None,
        }
    }

    pub fn mark_fully_connected(&mut self) {
        self.state = ConnectionState::FullyConnected;
    }

    /// Gamer IDs owned by this machine, in add order.
    pub fn gamers(&self) -> &[GamerId] {
        &self.gamers
    }

    pub fn add_gamer(&mut self, id: GamerId) {
        self.gamers.push(id);
    }

    pub fn remove_gamer(&mut self, id: GamerId) {
        self.gamers.retain(|g| *g != id);
    }
}
