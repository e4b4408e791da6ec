//! # Veilsocks
//!
//! A circumvention proxy made of two cooperating agents:
//!
//! - a **local agent** that speaks plain SOCKS5 to applications and forwards
//!   their traffic, stream-cipher encrypted, to
//! - a **server agent** that decrypts it, connects to the real destination
//!   and relays the responses back encrypted.
//!
//! ## Architecture
//!
//! ```text
//!  client ──SOCKS5──▶ LocalAgent ──[IV ‖ ciphertext]──▶ ServerAgent ──plain──▶ destination
//!         ◀─────────            ◀──[IV ‖ ciphertext]──             ◀────────
//!
//! ┌─────────────────────────────────────────────────────┐
//! │                    Proxy Layer                       │
//! │     (LocalAgent / ServerAgent state machines)        │
//! ├─────────────────────────────────────────────────────┤
//! │                    Relay Layer                       │
//! │   (RelayPipe, pending queues, connection watchdog)   │
//! ├─────────────────────────────────────────────────────┤
//! │                    Crypto Layer                      │
//! │  (method table, key derivation, cipher sessions)     │
//! ├─────────────────────────────────────────────────────┤
//! │                  Protocol Layer                      │
//! │        (address records, SOCKS5 wire format)         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod crypto;
pub mod protocol;
pub mod proxy;
pub mod relay;
pub mod transport;

pub use config::Config;
pub use proxy::{AgentContext, LocalAgent, ServerAgent};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Relay error: {0}")]
    Relay(#[from] relay::RelayError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Configuration error: {0}")]
    Config(String),
}
