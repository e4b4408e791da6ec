//! Protocol definitions and constants

pub mod address;
pub mod socks5;

pub use address::{parse as parse_address, Address, AddressRecord, AddressType};

use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid address type: {0:#04x}")]
    InvalidAddressType(u8),

    #[error("Invalid SOCKS version: {0:#04x}")]
    InvalidSocksVersion(u8),

    #[error("Domain name too long: {0} bytes")]
    DomainTooLong(usize),
}

/// Size of the per-read relay buffer
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Default local SOCKS5 listen port
pub const DEFAULT_LOCAL_PORT: u16 = 1080;

/// Default server agent listen port
pub const DEFAULT_SERVER_PORT: u16 = 8083;

/// Default connection timeout in seconds
pub const DEFAULT_TIMEOUT: u64 = 600;
