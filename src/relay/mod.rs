//! Relay layer - bidirectional byte bridging between two connections
//!
//! Provides:
//! - [`RelayPipe`], a duplex bridge with backpressure and coordinated teardown
//! - [`PendingQueue`], ordered buffering for a peer that is still connecting
//! - [`ConnectionWatchdog`], a one-shot per-connection deadline

mod pending;
mod pipe;
mod watchdog;

pub use pending::PendingQueue;
pub use pipe::{RelayPipe, RelayStats, HALF_CLOSE_IDLE};
pub use watchdog::ConnectionWatchdog;

use crate::crypto::{CryptoError, DecryptHalf, EncryptHalf};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Relay layer errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Watchdog fired after {0:?}")]
    WatchdogFired(Duration),
}

/// Per-direction chunk transform applied by [`RelayPipe`]
pub trait ChunkTransform: Send {
    /// Transform one chunk, continuing the direction's stream state
    fn transform(&mut self, chunk: &[u8]) -> Result<Bytes, CryptoError>;

    /// Minimum size the next chunk must reach before it can be transformed
    fn min_chunk_len(&self) -> usize {
        0
    }
}

impl ChunkTransform for EncryptHalf {
    fn transform(&mut self, chunk: &[u8]) -> Result<Bytes, CryptoError> {
        self.encrypt(chunk)
    }
}

impl ChunkTransform for DecryptHalf {
    fn transform(&mut self, chunk: &[u8]) -> Result<Bytes, CryptoError> {
        self.decrypt(chunk)
    }

    fn min_chunk_len(&self) -> usize {
        DecryptHalf::min_chunk_len(self)
    }
}

/// Forwards chunks unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct Plain;

impl ChunkTransform for Plain {
    fn transform(&mut self, chunk: &[u8]) -> Result<Bytes, CryptoError> {
        Ok(Bytes::copy_from_slice(chunk))
    }
}
