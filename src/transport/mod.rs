//! Transport layer
//!
//! Outbound TCP connection establishment, behind the [`Connector`] seam so
//! agents can be pointed at something other than the real network.

mod tcp;

pub use tcp::TcpConnector;

use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::net::TcpStream;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout")]
    Timeout,
}

/// Opens outbound TCP connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `host:port`; `host` may be a literal address or a name
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, TransportError>;
}
