// foxfire_session — host-authoritative multiplayer session orchestrator.
//
// This crate implements the session protocol: machines discover each other,
// establish a full-mesh group with one authoritative host, admit and remove
// gamer identities under a unique-ID invariant, and exchange protocol
// control plus opaque application payloads with configurable delivery
// guarantees. The transport itself is a collaborator, consumed through the
// `Transport` trait — nothing in here touches a socket.
//
// Module overview:
// - `transport.rs`: The consumed transport contract — `Transport`,
//                   `TransportEvent`, `SendTarget`, `EndPoint`.
// - `machine.rs`:   `Machine` and the per-machine handshake state machine
//                   (`Pending` → `Connecting` → `FullyConnected`).
// - `gamer.rs`:     `Gamer`, `PlayerIdentity`, and the per-tick packet
//                   queues local gamers carry.
// - `packet.rs`:    `Packet`/`PacketPool` — recycled payload buffers.
// - `session.rs`:   `Session` — registries, dispatcher, the four-phase
//                   `update()` loop, and the public API.
// - `error.rs`:     `SessionError`/`JoinError`.
//
// Concurrency model: single-threaded and cooperative. The owner calls
// `Session::update()` once per frame; the transport may buffer events on
// background threads, but session state is only ever touched from inside
// `update()`, so the core carries no locks. The only blocking waits are the
// explicit discovery/join windows in `Session::find`/`Session::join`.
//
// Known gap: host migration is not implemented. When a non-host machine
// loses its host connection the whole session tears down and surfaces
// `SessionEvent::SessionEnded`.

pub mod error;
pub mod gamer;
pub mod machine;
pub mod packet;
pub mod session;
pub mod transport;

pub use error::{JoinError, SessionError};
pub use gamer::{Gamer, InboundPacket, MachineKey, PlayerIdentity};
pub use machine::{ConnectionState, Machine};
pub use packet::{Packet, PacketPool};
pub use session::{
    AvailableSession, EndReason, MAX_SUPPORTED_GAMERS, Received, SESSION_PORT, Session,
    SessionConfig, SessionEvent, SessionState,
};
pub use transport::{EndPoint, SendTarget, Transport, TransportEvent};
