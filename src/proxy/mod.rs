//! Proxy agents
//!
//! Provides:
//! - [`LocalAgent`], the SOCKS5 front-end that encrypts towards the server
//! - [`ServerAgent`], which decrypts relay frames and dials destinations
//!
//! Each agent pairs a sans-IO session state machine with a small tokio
//! driver; the state machines can be exercised without sockets.

mod filter;
mod local;
mod server;
mod udp;

pub use filter::{AllowAll, DestinationFilter, HostBlocklist};
pub use local::{LocalAgent, LocalEvent, LocalSession, LocalStage};
pub use server::{ServerAgent, ServerEvent, ServerSession, ServerStage};
pub use udp::{NullUdpRelay, UdpRelayFactory, UdpRelayHandle};

use crate::crypto::{CryptoError, KeyCache};
use crate::protocol::socks5::{self, AuthMethod, Reply};
use crate::protocol::ProtocolError;
use crate::relay::RelayError;
use crate::transport::{Connector, TcpConnector, TransportError};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("No acceptable authentication method offered")]
    NoAcceptableMethod,

    #[error("Unsupported command: {0:#04x}")]
    UnsupportedCommand(u8),

    #[error("Invalid request: {0}")]
    InvalidRequest(ProtocolError),

    #[error("Failed to connect to {target}: {source}")]
    UpstreamConnect {
        target: String,
        #[source]
        source: TransportError,
    },

    #[error("Destination rejected by policy: {0}")]
    PolicyRejected(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Session closed")]
    Closed,
}

impl ProxyError {
    /// SOCKS5 reply owed to the client before closing, if any.
    ///
    /// Only method negotiation failures and unsupported commands are
    /// answered; everything else closes silently.
    pub fn socks_reply(&self) -> Option<Bytes> {
        match self {
            ProxyError::NoAcceptableMethod | ProxyError::Protocol(_) => {
                Some(socks5::method_reply(AuthMethod::NoAcceptable))
            }
            ProxyError::UnsupportedCommand(_) => {
                Some(socks5::failure_reply(Reply::CommandNotSupported))
            }
            _ => None,
        }
    }
}

/// Shared state injected into agents.
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct AgentContext {
    /// Derived key cache shared by every connection
    pub keys: Arc<KeyCache>,
    /// Local agent destination policy
    pub filter: Arc<dyn DestinationFilter>,
    /// UDP relay created once at listener startup
    pub udp: Arc<dyn UdpRelayFactory>,
    /// Outbound connection factory
    pub connector: Arc<dyn Connector>,
}

impl Default for AgentContext {
    fn default() -> Self {
        Self {
            keys: Arc::new(KeyCache::new()),
            filter: Arc::new(AllowAll),
            udp: Arc::new(NullUdpRelay),
            connector: Arc::new(TcpConnector::new()),
        }
    }
}

impl AgentContext {
    /// Replace the destination filter
    pub fn with_filter(mut self, filter: impl DestinationFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Replace the outbound connector
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Replace the UDP relay factory
    pub fn with_udp_relay(mut self, udp: impl UdpRelayFactory + 'static) -> Self {
        self.udp = Arc::new(udp);
        self
    }
}

/// Log the end of a failed connection at a level matching its cause
fn log_failure(peer: SocketAddr, err: &ProxyError) {
    match err {
        ProxyError::UpstreamConnect { .. } => warn!("{}: {}", peer, err),
        ProxyError::PolicyRejected(_) | ProxyError::Timeout => info!("{}: {}", peer, err),
        _ => debug!("{}: connection error: {}", peer, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks_replies() {
        let reply = ProxyError::NoAcceptableMethod.socks_reply().unwrap();
        assert_eq!(&reply[..], &[0x05, 0xFF]);

        let reply = ProxyError::Protocol(ProtocolError::InvalidSocksVersion(4))
            .socks_reply()
            .unwrap();
        assert_eq!(&reply[..], &[0x05, 0xFF]);

        let reply = ProxyError::UnsupportedCommand(2).socks_reply().unwrap();
        assert_eq!(&reply[..2], &[0x05, 0x07]);

        assert!(ProxyError::PolicyRejected("x:1".into()).socks_reply().is_none());
        assert!(ProxyError::InvalidRequest(ProtocolError::InvalidAddressType(9))
            .socks_reply()
            .is_none());
    }
}
