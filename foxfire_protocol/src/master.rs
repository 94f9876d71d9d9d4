// Master-server request/response envelopes.
//
// Hosts register themselves with the master server so WAN searchers can list
// them and request NAT-traversal introductions. Every request carries the
// same envelope prefix — application id, shared payload secret, kind byte —
// followed by kind-specific fields. The server validates the id and secret
// before acting, except for `RequestGeneralInfo`, which deliberately skips
// secret validation so outdated clients can still fetch version-alert text.
//
// Responses carry a kind byte of their own: a searcher's socket receives
// host listings it asked for, but a registered host can also receive an
// unsolicited `Introduce` when a client requests rendezvous with it.

use std::net::SocketAddr;

use uuid::Uuid;

use crate::advert::SessionAdvert;
use crate::wire::{PacketReader, PacketWriter, WireError};

const REQUEST_GENERAL_INFO: u8 = 0;
const REQUEST_REGISTER_HOST: u8 = 1;
const REQUEST_UNREGISTER_HOST: u8 = 2;
const REQUEST_HOSTS: u8 = 3;
const REQUEST_INTRODUCTION: u8 = 4;

const RESPONSE_GENERAL_INFO: u8 = 0;
const RESPONSE_HOST_ENTRY: u8 = 1;
const RESPONSE_INTRODUCE: u8 = 2;

/// One request to the master server, minus the envelope prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MasterRequest {
    /// Fetch the server's free-form info string. No secret required.
    RequestGeneralInfo,
    /// Announce (or refresh) a joinable host. The server records the
    /// sender's observed address as the host's external endpoint.
    RegisterHost {
        guid: Uuid,
        internal: SocketAddr,
        advert: SessionAdvert,
    },
    /// Retract a previous registration.
    UnregisterHost { guid: Uuid },
    /// List all live hosts, one `HostEntry` response per host.
    RequestHosts,
    /// Ask the server to relay endpoints between this client and the named
    /// host so both can attempt a direct connection.
    RequestIntroduction { guid: Uuid, client_internal: SocketAddr },
}

/// A request together with its validated envelope fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterEnvelope {
    pub app_id: String,
    pub payload_secret: String,
    pub request: MasterRequest,
}

impl MasterEnvelope {
    pub fn new(app_id: &str, payload_secret: &str, request: MasterRequest) -> Self {
        Self {
            app_id: app_id.into(),
            payload_secret: payload_secret.into(),
            request,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_string(&self.app_id);
        w.write_string(&self.payload_secret);
        match &self.request {
            MasterRequest::RequestGeneralInfo => {
                w.write_u8(REQUEST_GENERAL_INFO);
            }
            MasterRequest::RegisterHost {
                guid,
                internal,
                advert,
            } => {
                w.write_u8(REQUEST_REGISTER_HOST);
                w.write_string(&guid.to_string());
                w.write_end_point(*internal);
                advert.encode(&mut w);
            }
            MasterRequest::UnregisterHost { guid } => {
                w.write_u8(REQUEST_UNREGISTER_HOST);
                w.write_string(&guid.to_string());
            }
            MasterRequest::RequestHosts => {
                w.write_u8(REQUEST_HOSTS);
            }
            MasterRequest::RequestIntroduction {
                guid,
                client_internal,
            } => {
                w.write_u8(REQUEST_INTRODUCTION);
                w.write_string(&guid.to_string());
                w.write_end_point(*client_internal);
            }
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = PacketReader::new(bytes);
        let app_id = r.read_string()?;
        let payload_secret = r.read_string()?;
        let kind = r.read_u8()?;
        let request = match kind {
            REQUEST_GENERAL_INFO => MasterRequest::RequestGeneralInfo,
            REQUEST_REGISTER_HOST => MasterRequest::RegisterHost {
                guid: read_guid(&mut r)?,
                internal: r.read_end_point()?,
                advert: SessionAdvert::decode(&mut r)?,
            },
            REQUEST_UNREGISTER_HOST => MasterRequest::UnregisterHost {
                guid: read_guid(&mut r)?,
            },
            REQUEST_HOSTS => MasterRequest::RequestHosts,
            REQUEST_INTRODUCTION => MasterRequest::RequestIntroduction {
                guid: read_guid(&mut r)?,
                client_internal: r.read_end_point()?,
            },
            other => return Err(WireError::UnknownKind(other)),
        };
        Ok(Self {
            app_id,
            payload_secret,
            request,
        })
    }
}

/// One response from the master server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MasterResponse {
    /// The server's free-form info string (version alerts and the like).
    GeneralInfo { info: String },
    /// One live host from a `RequestHosts` listing.
    HostEntry { guid: Uuid, advert: SessionAdvert },
    /// Rendezvous endpoints for the counterparty of an introduction.
    Introduce {
        internal: SocketAddr,
        external: SocketAddr,
    },
}

impl MasterResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::new();
        match self {
            MasterResponse::GeneralInfo { info } => {
                w.write_u8(RESPONSE_GENERAL_INFO);
                w.write_string(info);
            }
            MasterResponse::HostEntry { guid, advert } => {
                w.write_u8(RESPONSE_HOST_ENTRY);
                w.write_string(&guid.to_string());
                advert.encode(&mut w);
            }
            MasterResponse::Introduce { internal, external } => {
                w.write_u8(RESPONSE_INTRODUCE);
                w.write_end_point(*internal);
                w.write_end_point(*external);
            }
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = PacketReader::new(bytes);
        match r.read_u8()? {
            RESPONSE_GENERAL_INFO => Ok(MasterResponse::GeneralInfo {
                info: r.read_string()?,
            }),
            RESPONSE_HOST_ENTRY => Ok(MasterResponse::HostEntry {
                guid: read_guid(&mut r)?,
                advert: SessionAdvert::decode(&mut r)?,
            }),
            RESPONSE_INTRODUCE => Ok(MasterResponse::Introduce {
                internal: r.read_end_point()?,
                external: r.read_end_point()?,
            }),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

fn read_guid(r: &mut PacketReader<'_>) -> Result<Uuid, WireError> {
    Uuid::parse_str(&r.read_string()?).map_err(|_| WireError::InvalidGuid)
}
