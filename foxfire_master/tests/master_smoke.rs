// Integration smoke test for the master server.
//
// Starts a master server on localhost, points real UDP clients at it, and
// exercises the full lifecycle: host registration, host listing, NAT
// introduction relay to both parties, general info, and unregistration.
//
// Each client is the library's `MasterClient` — the same code a game host
// or searcher runs, no mocks involved.

use std::net::SocketAddr;
use std::time::Duration;

use foxfire_master::client::MasterClient;
use foxfire_master::registry::MasterConfig;
use foxfire_master::server::start_master;
use foxfire_protocol::{MasterResponse, SessionAdvert, SessionKind, SessionProperties};
use uuid::Uuid;

/// How long clients wait for server responses in these tests.
const RESPONSE_WINDOW: Duration = Duration::from_millis(300);

/// Delay after fire-and-forget requests so the server processes them.
const SETTLE: Duration = Duration::from_millis(150);

fn advert(tag: &str) -> SessionAdvert {
    SessionAdvert {
        kind: SessionKind::PlayerMatch,
        max_gamers: 8,
        private_slots: 2,
        current_gamer_count: 1,
        host_gamertag: tag.into(),
        open_private_slots: 2,
        open_public_slots: 5,
        properties: SessionProperties(vec![Some(1)]),
    }
}

/// Start a master on a random port and return its loopback address.
fn start_test_master(config: MasterConfig) -> (foxfire_master::MasterHandle, SocketAddr) {
    let (handle, addr) = start_master(MasterConfig { port: 0, ..config }).unwrap();
    (handle, SocketAddr::from(([127, 0, 0, 1], addr.port())))
}

#[test]
fn register_list_unregister() {
    let (handle, addr) = start_test_master(MasterConfig::default());

    let host = MasterClient::new(addr, "foxfire", "foxfire-master").unwrap();
    let searcher = MasterClient::new(addr, "foxfire", "foxfire-master").unwrap();

    let guid = Uuid::new_v4();
    let internal: SocketAddr = "192.168.0.10:14242".parse().unwrap();
    host.register_host(guid, internal, advert("SmokeHost")).unwrap();
    std::thread::sleep(SETTLE);

    let hosts = searcher.request_hosts(RESPONSE_WINDOW).unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].0, guid);
    assert_eq!(hosts[0].1.host_gamertag, "SmokeHost");

    host.unregister_host(guid).unwrap();
    std::thread::sleep(SETTLE);

    let hosts = searcher.request_hosts(RESPONSE_WINDOW).unwrap();
    assert!(hosts.is_empty());

    handle.stop();
}

#[test]
fn introduction_reaches_both_parties() {
    let (handle, addr) = start_test_master(MasterConfig::default());

    let host = MasterClient::new(addr, "foxfire", "foxfire-master").unwrap();
    let searcher = MasterClient::new(addr, "foxfire", "foxfire-master").unwrap();

    let guid = Uuid::new_v4();
    let host_internal: SocketAddr = "192.168.0.10:14242".parse().unwrap();
    host.register_host(guid, host_internal, advert("NatHost")).unwrap();
    std::thread::sleep(SETTLE);

    let client_internal: SocketAddr = "192.168.7.3:4000".parse().unwrap();
    searcher.request_introduction(guid, client_internal).unwrap();

    // The searcher learns the host's endpoints.
    let responses = searcher.collect_responses(RESPONSE_WINDOW).unwrap();
    let introduce = responses.iter().find_map(|r| match r {
        MasterResponse::Introduce { internal, external } => Some((*internal, *external)),
        _ => None,
    });
    let (internal, external) = introduce.expect("searcher should receive Introduce");
    assert_eq!(internal, host_internal);
    assert_eq!(external.port(), host.local_addr().unwrap().port());

    // The registered host receives the unsolicited counterpart.
    let responses = host.collect_responses(RESPONSE_WINDOW).unwrap();
    let introduce = responses.iter().find_map(|r| match r {
        MasterResponse::Introduce { internal, external } => Some((*internal, *external)),
        _ => None,
    });
    let (internal, external) = introduce.expect("host should receive Introduce");
    assert_eq!(internal, client_internal);
    assert_eq!(external.port(), searcher.local_addr().unwrap().port());

    handle.stop();
}

#[test]
fn general_info_served_without_secret() {
    let (handle, addr) = start_test_master(MasterConfig {
        general_info: "update to v2".into(),
        ..MasterConfig::default()
    });

    // A client with a stale secret can still fetch general info...
    let outdated = MasterClient::new(addr, "foxfire", "old-secret").unwrap();
    let info = outdated.request_general_info(RESPONSE_WINDOW).unwrap();
    assert_eq!(info.as_deref(), Some("update to v2"));

    // ...but not the host list.
    let hosts = outdated.request_hosts(RESPONSE_WINDOW).unwrap();
    assert!(hosts.is_empty());

    handle.stop();
}
