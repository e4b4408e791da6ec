//! Bidirectional relay between two duplex connections

use super::{ChunkTransform, RelayError};
use crate::protocol::RELAY_BUFFER_SIZE;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// How long the surviving direction may sit idle once the other has ended
pub const HALF_CLOSE_IDLE: Duration = Duration::from_secs(2);

/// Bytes forwarded in each direction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes written to `b` after transformation
    pub a_to_b: u64,
    /// Bytes written to `a` after transformation
    pub b_to_a: u64,
}

/// Symmetric duplex bridge between `a` and `b`.
///
/// Each direction reads a chunk, transforms it and writes it to the other
/// side; the next read is only issued once the sink has accepted the whole
/// chunk, so a saturated sink pauses its source. End-of-stream on one side
/// half-closes the other. The remaining direction keeps relaying until it
/// ends too or stays idle for the half-close deadline, then both connections
/// are dropped. A read, write or transform error tears both down at once.
pub struct RelayPipe<A, B> {
    a: A,
    b: B,
    buffer_size: usize,
    half_close_idle: Duration,
}

impl<A, B> RelayPipe<A, B>
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    /// Create a pipe between two connections
    pub fn new(a: A, b: B) -> Self {
        Self {
            a,
            b,
            buffer_size: RELAY_BUFFER_SIZE,
            half_close_idle: HALF_CLOSE_IDLE,
        }
    }

    /// Override the per-read buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Override how long a half-closed pipe may idle before full close
    pub fn with_half_close_idle(mut self, idle: Duration) -> Self {
        self.half_close_idle = idle;
        self
    }

    /// Relay until both directions have ended or either fails
    pub async fn run<TA, TB>(self, a_to_b: TA, b_to_a: TB) -> Result<RelayStats, RelayError>
    where
        TA: ChunkTransform,
        TB: ChunkTransform,
    {
        let (a_read, a_write) = tokio::io::split(self.a);
        let (b_read, b_write) = tokio::io::split(self.b);
        let forward = AtomicU64::new(0);
        let backward = AtomicU64::new(0);

        {
            let up = pump(a_read, b_write, a_to_b, self.buffer_size, &forward, "a->b");
            let down = pump(b_read, a_write, b_to_a, self.buffer_size, &backward, "b->a");
            tokio::pin!(up, down);

            tokio::select! {
                result = &mut up => {
                    result?;
                    linger(down, &backward, self.half_close_idle, "b->a").await?;
                }
                result = &mut down => {
                    result?;
                    linger(up, &forward, self.half_close_idle, "a->b").await?;
                }
            }
        }

        Ok(RelayStats {
            a_to_b: forward.into_inner(),
            b_to_a: backward.into_inner(),
        })
    }
}

/// Drive the surviving direction until it ends or makes no progress for `idle`
async fn linger<F>(
    mut rest: Pin<&mut F>,
    progress: &AtomicU64,
    idle: Duration,
    direction: &'static str,
) -> Result<(), RelayError>
where
    F: Future<Output = Result<(), RelayError>>,
{
    loop {
        let before = progress.load(Ordering::Relaxed);
        match tokio::time::timeout(idle, rest.as_mut()).await {
            Ok(result) => return result,
            Err(_) if progress.load(Ordering::Relaxed) == before => {
                debug!(direction, "peer ended and direction idle, closing");
                return Ok(());
            }
            Err(_) => continue,
        }
    }
}

/// Copy one direction until end-of-stream
async fn pump<R, W, T>(
    mut reader: R,
    mut writer: W,
    mut transform: T,
    buffer_size: usize,
    forwarded: &AtomicU64,
    direction: &'static str,
) -> Result<(), RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    T: ChunkTransform,
{
    let capacity = buffer_size.max(transform.min_chunk_len()).max(1);
    let mut buf = vec![0u8; capacity];
    let mut filled = 0;

    loop {
        let n = reader.read(&mut buf[filled..]).await?;

        if n == 0 {
            if filled > 0 {
                // Ended before a full header arrived
                let chunk = transform.transform(&buf[..filled])?;
                writer.write_all(&chunk).await?;
                forwarded.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            trace!(direction, "source ended, half-closing sink");
            if let Err(e) = writer.shutdown().await {
                trace!(direction, error = %e, "half-close failed");
            }
            return Ok(());
        }

        filled += n;
        if filled < transform.min_chunk_len() {
            continue;
        }

        let chunk = transform.transform(&buf[..filled])?;
        filled = 0;
        if chunk.is_empty() {
            continue;
        }

        writer.write_all(&chunk).await?;
        writer.flush().await?;
        forwarded.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        trace!(direction, bytes = chunk.len(), "relayed chunk");
    }
}
