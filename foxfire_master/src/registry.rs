// Host registry for the master server.
//
// `HostRegistry` is the central data structure `server.rs` drives. It tracks
// every registered session host, validates request envelopes, answers host
// listings, relays NAT-traversal introductions, and evicts hosts whose
// registrations have gone stale. All mutation happens through methods called
// from the server's single-threaded socket loop — no internal locking.
//
// The registry is transport-free: `handle_datagram` takes raw bytes plus the
// sender's observed address and returns the datagrams to send back. The
// clock is injected on every call, which keeps eviction fully unit-testable.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use foxfire_protocol::{MasterEnvelope, MasterRequest, MasterResponse, SessionAdvert};
use tracing::{info, warn};
use uuid::Uuid;

/// Configuration for a master server instance.
#[derive(Clone, Debug)]
pub struct MasterConfig {
    pub port: u16,
    /// Application identifier every request must carry.
    pub app_id: String,
    /// Shared secret validating all requests except general info.
    pub payload_secret: String,
    /// Free-form string served to `RequestGeneralInfo` (version alerts).
    pub general_info: String,
    /// How often hosts are expected to re-register.
    pub registration_interval: Duration,
    /// Extra slack on top of the registration interval before eviction.
    pub trim_grace: Duration,
    /// How often the host count is logged.
    pub status_interval: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            port: 14243,
            app_id: "foxfire".into(),
            payload_secret: "foxfire-master".into(),
            general_info: String::new(),
            registration_interval: Duration::from_secs(60),
            trim_grace: Duration::from_secs(5),
            status_interval: Duration::from_secs(60),
        }
    }
}

/// One registered session host.
#[derive(Clone, Debug)]
pub struct HostData {
    pub guid: Uuid,
    /// Address the host sees itself at (behind its NAT).
    pub internal: SocketAddr,
    /// Address the master server observed the registration from.
    pub external: SocketAddr,
    pub advert: SessionAdvert,
    pub last_updated: Instant,
}

/// The master server's mutable state: registered hosts plus status cadence.
pub struct HostRegistry {
    config: MasterConfig,
    hosts: BTreeMap<Uuid, HostData>,
    last_reported_status: Option<Instant>,
}

impl HostRegistry {
    pub fn new(config: MasterConfig) -> Self {
        Self {
            config,
            hosts: BTreeMap::new(),
            last_reported_status: None,
        }
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn host(&self, guid: Uuid) -> Option<&HostData> {
        self.hosts.get(&guid)
    }

    /// Handle one request datagram and return the datagrams to send in
    /// response. Malformed or unauthorized requests are logged and produce
    /// nothing — the server never crashes on peer input.
    pub fn handle_datagram(
        &mut self,
        bytes: &[u8],
        sender: SocketAddr,
        now: Instant,
    ) -> Vec<(Vec<u8>, SocketAddr)> {
        let envelope = match MasterEnvelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%sender, %err, "malformed master server message");
                return Vec::new();
            }
        };
        if envelope.app_id != self.config.app_id {
            warn!(%sender, app_id = %envelope.app_id, "message with incorrect app id");
            return Vec::new();
        }

        // General info deliberately skips secret validation so outdated
        // clients can still read version alerts.
        if envelope.request == MasterRequest::RequestGeneralInfo {
            let response = MasterResponse::GeneralInfo {
                info: self.config.general_info.clone(),
            };
            return vec![(response.encode(), sender)];
        }

        if envelope.payload_secret != self.config.payload_secret {
            warn!(%sender, "message failed payload validation");
            return Vec::new();
        }

        match envelope.request {
            MasterRequest::RequestGeneralInfo => Vec::new(),
            MasterRequest::RegisterHost {
                guid,
                internal,
                advert,
            } => {
                info!(%guid, %internal, external = %sender, "host registered/updated");
                self.hosts.insert(
                    guid,
                    HostData {
                        guid,
                        internal,
                        external: sender,
                        advert,
                        last_updated: now,
                    },
                );
                Vec::new()
            }
            MasterRequest::UnregisterHost { guid } => {
                match self.hosts.get(&guid) {
                    Some(host) if host.external == sender => {
                        info!(%guid, "host unregistered");
                        self.hosts.remove(&guid);
                    }
                    Some(_) => {
                        warn!(%sender, %guid, "unregister requested by a different endpoint");
                    }
                    None => {
                        warn!(%sender, %guid, "unregister requested for unknown host");
                    }
                }
                Vec::new()
            }
            MasterRequest::RequestHosts => {
                info!(%sender, hosts = self.hosts.len(), "host list requested");
                self.hosts
                    .values()
                    .map(|host| {
                        let response = MasterResponse::HostEntry {
                            guid: host.guid,
                            advert: host.advert.clone(),
                        };
                        (response.encode(), sender)
                    })
                    .collect()
            }
            MasterRequest::RequestIntroduction {
                guid,
                client_internal,
            } => {
                let Some(host) = self.hosts.get(&guid) else {
                    warn!(%sender, %guid, "introduction requested for unknown host");
                    return Vec::new();
                };
                info!(%guid, client = %sender, "introducing host and client");
                // Each party learns the other's endpoints and attempts a
                // direct connection; the server never relays game data.
                let to_client = MasterResponse::Introduce {
                    internal: host.internal,
                    external: host.external,
                };
                let to_host = MasterResponse::Introduce {
                    internal: client_internal,
                    external: sender,
                };
                vec![
                    (to_client.encode(), sender),
                    (to_host.encode(), host.external),
                ]
            }
        }
    }

    /// Evict hosts that have not re-registered within the registration
    /// interval plus grace.
    pub fn trim_hosts(&mut self, now: Instant) {
        let threshold = self.config.registration_interval + self.config.trim_grace;
        let expired: Vec<Uuid> = self
            .hosts
            .values()
            .filter(|host| now.saturating_duration_since(host.last_updated) > threshold)
            .map(|host| host.guid)
            .collect();
        for guid in expired {
            self.hosts.remove(&guid);
            info!(%guid, "host removed due to timeout");
        }
    }

    /// Log the registry size at the configured cadence.
    pub fn report_status(&mut self, now: Instant) {
        let due = self
            .last_reported_status
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.status_interval);
        if due {
            info!(hosts = self.hosts.len(), "master server status");
            self.last_reported_status = Some(now);
        }
    }
}
