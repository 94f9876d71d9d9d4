// Error taxonomy for session operations.
//
// Configuration errors are raised synchronously at the violating call and
// are fatal to that call only. Join failures carry a reason code. Transport
// faults mean the transport collaborator broke its contract and are fatal to
// the session. Protocol violations by peers are *not* errors — the session
// removes the offending machine and keeps running (see `session.rs`).

use foxfire_protocol::{GamerId, SessionKind};
use thiserror::Error;

/// Why a `join` attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("no connection to the host could be established")]
    SessionNotFound,
    #[error("the session has no open slots")]
    SessionFull,
}

/// Any failure surfaced by the public session API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("max_gamers must be in the range [2, 64], got {0}")]
    MaxGamersOutOfRange(i32),
    #[error("private_slots must be in the range [0, max_gamers], got {0}")]
    PrivateSlotsOutOfRange(i32),
    #[error("session kind {0:?} cannot be searched for")]
    UnsupportedSessionKind(SessionKind),
    #[error("failed to join session: {0}")]
    Join(#[from] JoinError),
    #[error("gamer {0} is not a local gamer of this session")]
    NoSuchLocalGamer(GamerId),
    #[error("{0} may only be called by the host")]
    HostOnly(&'static str),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("the session has been disposed")]
    Disposed,
    #[error("transport contract violation: {0}")]
    Transport(String),
}
