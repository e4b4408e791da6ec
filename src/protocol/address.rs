//! Address record codec
//!
//! The same `ATYP | DST.ADDR | DST.PORT` record appears in SOCKS5 requests
//! (after a 3-byte `VER CMD RSV` prefix) and at the very start of the first
//! decrypted relay chunk. [`parse`] takes the starting offset so both shapes
//! share one parser.

use super::ProtocolError;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// Offset of the address record inside a SOCKS5 request
pub const SOCKS_REQUEST_OFFSET: usize = 3;

/// Offset of the address record inside the first relay chunk
pub const RELAY_FRAME_OFFSET: usize = 0;

/// Address types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressType {
    Ipv4 = 0x01,
    Domain = 0x03,
    Ipv6 = 0x04,
}

impl TryFrom<u8> for AddressType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(AddressType::Ipv4),
            0x03 => Ok(AddressType::Domain),
            0x04 => Ok(AddressType::Ipv6),
            _ => Err(ProtocolError::InvalidAddressType(value)),
        }
    }
}

/// Destination address and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IPv4 address and port
    Ipv4([u8; 4], u16),
    /// IPv6 address and port
    Ipv6([u8; 16], u16),
    /// Domain name and port
    Domain(String, u16),
}

impl Address {
    /// Get the port
    pub fn port(&self) -> u16 {
        match self {
            Address::Ipv4(_, port) | Address::Ipv6(_, port) | Address::Domain(_, port) => *port,
        }
    }

    /// Wire tag for this address
    pub fn address_type(&self) -> AddressType {
        match self {
            Address::Ipv4(..) => AddressType::Ipv4,
            Address::Ipv6(..) => AddressType::Ipv6,
            Address::Domain(..) => AddressType::Domain,
        }
    }

    /// Host part, without the port
    pub fn host(&self) -> String {
        match self {
            Address::Ipv4(ip, _) => Ipv4Addr::from(*ip).to_string(),
            Address::Ipv6(ip, _) => Ipv6Addr::from(*ip).to_string(),
            Address::Domain(domain, _) => domain.clone(),
        }
    }

    /// Number of bytes [`Address::write_to`] emits
    pub fn encoded_len(&self) -> usize {
        match self {
            Address::Ipv4(..) => 1 + 4 + 2,
            Address::Ipv6(..) => 1 + 16 + 2,
            Address::Domain(domain, _) => 1 + 1 + domain.len() + 2,
        }
    }

    /// Append `ATYP | ADDR | PORT` to `buf`
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.address_type() as u8);

        match self {
            Address::Ipv4(ip, _) => buf.put_slice(ip),
            Address::Ipv6(ip, _) => buf.put_slice(ip),
            Address::Domain(domain, _) => {
                let len = u8::try_from(domain.len())
                    .map_err(|_| ProtocolError::DomainTooLong(domain.len()))?;
                buf.put_u8(len);
                buf.put_slice(domain.as_bytes());
            }
        }

        buf.put_u16(self.port());
        Ok(())
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Address::Ipv4(v4.ip().octets(), v4.port()),
            SocketAddr::V6(v6) => Address::Ipv6(v6.ip().octets(), v6.port()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ipv4(ip, port) => write!(f, "{}:{}", Ipv4Addr::from(*ip), port),
            Address::Ipv6(ip, port) => write!(f, "[{}]:{}", Ipv6Addr::from(*ip), port),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

/// A parsed address record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    /// Destination address
    pub address: Address,
    /// Index one past the record's last byte, measured from the start of
    /// the buffer (so it includes the parse offset). Bytes from here on are
    /// payload.
    pub total_len: usize,
}

/// Parse an address record starting at `offset`.
///
/// Returns `Ok(None)` when `buf` does not yet hold the whole record; the
/// caller should buffer more input and parse again.
pub fn parse(buf: &[u8], offset: usize) -> Result<Option<AddressRecord>, ProtocolError> {
    let Some(&tag) = buf.get(offset) else {
        return Ok(None);
    };

    let (address, total_len) = match AddressType::try_from(tag)? {
        AddressType::Ipv4 => {
            let total_len = offset + 7;
            if buf.len() < total_len {
                return Ok(None);
            }
            let mut ip = [0u8; 4];
            ip.copy_from_slice(&buf[offset + 1..offset + 5]);
            let port = u16::from_be_bytes([buf[offset + 5], buf[offset + 6]]);
            (Address::Ipv4(ip, port), total_len)
        }
        AddressType::Ipv6 => {
            let total_len = offset + 19;
            if buf.len() < total_len {
                return Ok(None);
            }
            let mut ip = [0u8; 16];
            ip.copy_from_slice(&buf[offset + 1..offset + 17]);
            let port = u16::from_be_bytes([buf[offset + 17], buf[offset + 18]]);
            (Address::Ipv6(ip, port), total_len)
        }
        AddressType::Domain => {
            let Some(&len) = buf.get(offset + 1) else {
                return Ok(None);
            };
            let port_index = offset + 2 + len as usize;
            let total_len = port_index + 2;
            if buf.len() < total_len {
                return Ok(None);
            }
            let domain = String::from_utf8_lossy(&buf[offset + 2..port_index]).into_owned();
            let port = u16::from_be_bytes([buf[port_index], buf[port_index + 1]]);
            (Address::Domain(domain, port), total_len)
        }
    };

    Ok(Some(AddressRecord { address, total_len }))
}
