// foxfire_master — discovery and rendezvous master server for Foxfire.
//
// WAN sessions cannot rely on subnet broadcast, so hosts announce themselves
// to this server and searchers query it for joinable sessions. The server
// also relays NAT-traversal introductions: on request it sends each party
// the other's internal and external endpoints so both can attempt a direct
// connection. Game traffic never touches the master server.
//
// Module overview:
// - `registry.rs`: `HostRegistry` — registered hosts, envelope validation,
//                  introductions, timeout eviction, status logging. Pure
//                  state with an injected clock; fully unit-testable.
// - `server.rs`:   `start_master` — the UDP socket loop on a background
//                  thread with a stop handle.
// - `client.rs`:   `MasterClient` — the host/searcher side: register,
//                  unregister, list hosts, request introductions.
//
// Dependencies: `foxfire_protocol` (envelope and advert codecs). No
// dependency on the session crate.
//
// The server can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_master`).

pub mod client;
pub mod registry;
pub mod server;

pub use client::MasterClient;
pub use registry::{HostData, HostRegistry, MasterConfig};
pub use server::{MasterHandle, start_master};
