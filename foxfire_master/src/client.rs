// UDP client for talking to the master server.
//
// Used by session hosts (register/unregister their advert) and searchers
// (list hosts, request NAT-traversal introductions). All calls are plain
// request datagrams over one unconnected `UdpSocket`; responses are
// collected with a bounded wait, since the server answers asynchronously
// and an `Introduce` can even arrive unsolicited at a registered host.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use foxfire_protocol::{MasterEnvelope, MasterRequest, MasterResponse, SessionAdvert};
use tracing::debug;
use uuid::Uuid;

/// Largest response datagram the client accepts.
const MAX_DATAGRAM: usize = 4096;

/// Poll granularity while waiting for responses.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// A handle for exchanging envelopes with one master server.
pub struct MasterClient {
    socket: UdpSocket,
    server: SocketAddr,
    app_id: String,
    payload_secret: String,
}

impl MasterClient {
    /// Bind an ephemeral UDP socket for talking to `server`.
    pub fn new(server: SocketAddr, app_id: &str, payload_secret: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_read_timeout(Some(POLL_TIMEOUT))?;
        Ok(Self {
            socket,
            server,
            app_id: app_id.into(),
            payload_secret: payload_secret.into(),
        })
    }

    /// The address this client sends from (the host's internal endpoint as
    /// far as registration is concerned).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Announce (or refresh) a host registration. Call at least once per
    /// registration interval or the server will evict the entry.
    pub fn register_host(
        &self,
        guid: Uuid,
        internal: SocketAddr,
        advert: SessionAdvert,
    ) -> io::Result<()> {
        debug!(%guid, %internal, "registering with master server");
        self.send_request(MasterRequest::RegisterHost {
            guid,
            internal,
            advert,
        })
    }

    pub fn unregister_host(&self, guid: Uuid) -> io::Result<()> {
        debug!(%guid, "unregistering with master server");
        self.send_request(MasterRequest::UnregisterHost { guid })
    }

    /// List live hosts, waiting up to `window` for responses.
    pub fn request_hosts(&self, window: Duration) -> io::Result<Vec<(Uuid, SessionAdvert)>> {
        self.send_request(MasterRequest::RequestHosts)?;
        let hosts = self
            .collect_responses(window)?
            .into_iter()
            .filter_map(|response| match response {
                MasterResponse::HostEntry { guid, advert } => Some((guid, advert)),
                _ => None,
            })
            .collect();
        Ok(hosts)
    }

    /// Ask the server to introduce this client to the host with `guid`.
    /// Rendezvous endpoints arrive as `Introduce` responses on both sides.
    pub fn request_introduction(&self, guid: Uuid, client_internal: SocketAddr) -> io::Result<()> {
        debug!(%guid, "requesting introduction");
        self.send_request(MasterRequest::RequestIntroduction {
            guid,
            client_internal,
        })
    }

    /// Fetch the server's general info string (works even with a stale
    /// payload secret).
    pub fn request_general_info(&self, window: Duration) -> io::Result<Option<String>> {
        self.send_request(MasterRequest::RequestGeneralInfo)?;
        let info = self
            .collect_responses(window)?
            .into_iter()
            .find_map(|response| match response {
                MasterResponse::GeneralInfo { info } => Some(info),
                _ => None,
            });
        Ok(info)
    }

    /// Collect every decodable response arriving within `window`. Also how
    /// a registered host picks up unsolicited `Introduce` messages.
    pub fn collect_responses(&self, window: Duration) -> io::Result<Vec<MasterResponse>> {
        let deadline = Instant::now() + window;
        let mut responses = Vec::new();
        let mut buf = [0u8; MAX_DATAGRAM];
        while Instant::now() < deadline {
            match self.socket.recv_from(&mut buf) {
                Ok((len, sender)) => match MasterResponse::decode(&buf[..len]) {
                    Ok(response) => responses.push(response),
                    Err(err) => debug!(%sender, %err, "ignoring malformed master response"),
                },
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }

    fn send_request(&self, request: MasterRequest) -> io::Result<()> {
        let envelope = MasterEnvelope::new(&self.app_id, &self.payload_secret, request);
        self.socket.send_to(&envelope.encode(), self.server)?;
        Ok(())
    }
}
