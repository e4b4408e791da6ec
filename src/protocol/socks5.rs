//! SOCKS5 wire constants and reply encoding (RFC 1928)

use super::Address;
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// SOCKS5 version
pub const SOCKS_VERSION: u8 = 0x05;

/// Reserved byte
pub const RESERVED: u8 = 0x00;

/// Authentication methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    NoAuth = 0x00,
    NoAcceptable = 0xFF,
}

/// SOCKS5 commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl Command {
    /// Decode a command byte
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Command::Connect),
            0x02 => Some(Command::Bind),
            0x03 => Some(Command::UdpAssociate),
            _ => None,
        }
    }
}

/// Reply codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reply {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

/// `VER | METHOD`
pub fn method_reply(method: AuthMethod) -> Bytes {
    Bytes::copy_from_slice(&[SOCKS_VERSION, method as u8])
}

/// `VER | REP | RSV | ATYP | BND.ADDR | BND.PORT`
///
/// IPv4 bound addresses use ATYP 0x01, IPv6 ones ATYP 0x04.
pub fn make_reply(reply: Reply, bound: SocketAddr) -> Bytes {
    let address = Address::from(bound);
    let mut buf = BytesMut::with_capacity(3 + address.encoded_len());
    buf.put_u8(SOCKS_VERSION);
    buf.put_u8(reply as u8);
    buf.put_u8(RESERVED);
    // IP addresses never exceed the record limits
    let _ = address.write_to(&mut buf);
    buf.freeze()
}

/// CONNECT success reply, always ATYP 0x01.
///
/// An IPv6 bound address is reported as its IPv4-mapped form when it has
/// one and as `0.0.0.0` otherwise; the port is kept.
pub fn connect_reply(bound: SocketAddr) -> Bytes {
    let ip = match bound {
        SocketAddr::V4(v4) => *v4.ip(),
        SocketAddr::V6(v6) => v6.ip().to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    };
    make_reply(Reply::Succeeded, SocketAddr::V4(SocketAddrV4::new(ip, bound.port())))
}

/// Failure reply carrying an all-zero IPv4 bound address
pub fn failure_reply(reply: Reply) -> Bytes {
    make_reply(reply, SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_reply() {
        assert_eq!(&method_reply(AuthMethod::NoAuth)[..], &[0x05, 0x00]);
        assert_eq!(&method_reply(AuthMethod::NoAcceptable)[..], &[0x05, 0xFF]);
    }

    #[test]
    fn test_success_reply_ipv4() {
        let reply = make_reply(Reply::Succeeded, "10.0.0.2:40000".parse().unwrap());
        assert_eq!(
            &reply[..],
            &[0x05, 0x00, 0x00, 0x01, 10, 0, 0, 2, 0x9C, 0x40]
        );
    }

    #[test]
    fn test_reply_ipv6() {
        let reply = make_reply(Reply::Succeeded, "[::1]:1080".parse().unwrap());
        assert_eq!(reply.len(), 3 + 1 + 16 + 2);
        assert_eq!(reply[3], 0x04);
    }

    #[test]
    fn test_connect_reply_stays_ipv4() {
        let reply = connect_reply("[::1]:40000".parse().unwrap());
        assert_eq!(
            &reply[..],
            &[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0x9C, 0x40]
        );

        let reply = connect_reply("[::ffff:10.0.0.2]:1080".parse().unwrap());
        assert_eq!(
            &reply[..],
            &[0x05, 0x00, 0x00, 0x01, 10, 0, 0, 2, 0x04, 0x38]
        );

        let reply = connect_reply("127.0.0.1:8083".parse().unwrap());
        assert_eq!(&reply[4..], &[127, 0, 0, 1, 0x1F, 0x93]);
    }

    #[test]
    fn test_failure_reply() {
        let reply = failure_reply(Reply::CommandNotSupported);
        assert_eq!(&reply[..], &[0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }
}
