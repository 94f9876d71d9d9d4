// Byte-level encoding primitives shared by every protocol message.
//
// Every message on the wire starts with a one-byte kind tag followed by
// kind-specific fields in a fixed order. This module provides the
// `PacketWriter`/`PacketReader` pair that `message.rs`, `advert.rs`, and
// `master.rs` build on: little-endian fixed-width integers, one-byte bools,
// u16-length-prefixed UTF-8 strings, and tagged socket addresses.
//
// Reading is fully bounds-checked and never panics on malformed input —
// every `read_*` returns `WireError` instead. A `MAX_USER_PAYLOAD` constant
// protects against unbounded allocation from hostile length prefixes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;

/// Maximum allowed user-message payload (1 MB). Protects against unbounded
/// allocation from malformed length prefixes; application packets are
/// expected to stay well under this.
pub const MAX_USER_PAYLOAD: u32 = 1024 * 1024;

/// Decode failure for any protocol message. Encoding is infallible.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message ended before all fields were read")]
    UnexpectedEnd,
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown address family tag {0}")]
    InvalidAddressTag(u8),
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    #[error("unknown session kind {0}")]
    InvalidSessionKind(u8),
    #[error("gamer id 255 is reserved for broadcast")]
    ReservedGamerId,
    #[error("payload of {0} bytes exceeds the {MAX_USER_PAYLOAD} byte limit")]
    PayloadTooLarge(u32),
    #[error("malformed guid field")]
    InvalidGuid,
}

/// Append-only encoder for one outgoing message.
#[derive(Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u16-length-prefixed UTF-8 string. Protocol strings are short
    /// (gamertags, app ids); lengths beyond u16 are an upstream bug.
    pub fn write_string(&mut self, value: &str) {
        assert!(
            value.len() <= usize::from(u16::MAX),
            "protocol string too long"
        );
        #[expect(clippy::cast_possible_truncation)]
        self.write_u16(value.len() as u16);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Write a length-prefixed opaque byte payload.
    pub fn write_payload(&mut self, payload: &[u8]) {
        assert!(
            payload.len() <= MAX_USER_PAYLOAD as usize,
            "payload exceeds MAX_USER_PAYLOAD"
        );
        #[expect(clippy::cast_possible_truncation)]
        self.write_u32(payload.len() as u32);
        self.buf.extend_from_slice(payload);
    }

    /// Write a socket address: family tag (4 or 6), octets, then port.
    pub fn write_end_point(&mut self, addr: SocketAddr) {
        match addr.ip() {
            IpAddr::V4(ip) => {
                self.write_u8(4);
                self.buf.extend_from_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                self.write_u8(6);
                self.buf.extend_from_slice(&ip.octets());
            }
        }
        self.write_u16(addr.port());
    }
}

/// Bounds-checked decoder over one incoming message.
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(len).ok_or(WireError::UnexpectedEnd)?;
        if end > self.buf.len() {
            return Err(WireError::UnexpectedEnd);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    /// Read a length-prefixed opaque byte payload, enforcing
    /// `MAX_USER_PAYLOAD`.
    pub fn read_payload(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_u32()?;
        if len > MAX_USER_PAYLOAD {
            return Err(WireError::PayloadTooLarge(len));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    pub fn read_end_point(&mut self) -> Result<SocketAddr, WireError> {
        let tag = self.read_u8()?;
        let ip = match tag {
            4 => {
                let o = self.take(4)?;
                IpAddr::V4(Ipv4Addr::new(o[0], o[1], o[2], o[3]))
            }
            6 => {
                let o = self.take(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(o);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            other => return Err(WireError::InvalidAddressTag(other)),
        };
        let port = self.read_u16()?;
        Ok(SocketAddr::new(ip, port))
    }

    /// Bytes not yet consumed. Trailing bytes after a full decode are
    /// tolerated, matching the transport's framed-message contract.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
