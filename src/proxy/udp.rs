//! UDP relay seam
//!
//! UDP-associate traffic is carried by a relay created once per listener.
//! Agents only need its bound address, which the local agent reports in
//! its UDP-associate reply.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

/// A running UDP relay
pub trait UdpRelayHandle: Send + Sync {
    /// Address clients should send datagrams to
    fn local_addr(&self) -> SocketAddr;
}

/// Creates the UDP relay for a listener
pub trait UdpRelayFactory: Send + Sync {
    /// Called once after the TCP listener is bound to `listen`
    fn create(&self, listen: SocketAddr, is_server: bool) -> io::Result<Arc<dyn UdpRelayHandle>>;
}

/// Factory whose relay relays nothing and reports the listener address
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUdpRelay;

struct NullHandle(SocketAddr);

impl UdpRelayHandle for NullHandle {
    fn local_addr(&self) -> SocketAddr {
        self.0
    }
}

impl UdpRelayFactory for NullUdpRelay {
    fn create(&self, listen: SocketAddr, _is_server: bool) -> io::Result<Arc<dyn UdpRelayHandle>> {
        Ok(Arc::new(NullHandle(listen)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_relay_reports_listener() {
        let listen: SocketAddr = "127.0.0.1:1080".parse().unwrap();
        let handle = NullUdpRelay.create(listen, false).unwrap();
        assert_eq!(handle.local_addr(), listen);
    }
}
