//! Ordered buffering for a peer that is not connected yet

use bytes::Bytes;
use std::collections::VecDeque;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Chunks held back while the remote connection is being established.
///
/// Flushing or discarding consumes the queue, so nothing can be appended
/// once the connection has been decided either way.
#[derive(Debug, Default)]
pub struct PendingQueue {
    chunks: VecDeque<Bytes>,
    queued_bytes: usize,
}

impl PendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; empty chunks are ignored
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.queued_bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Number of queued chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total queued payload
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// Write every chunk to `writer` in arrival order
    pub async fn flush<W>(self, writer: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        for chunk in &self.chunks {
            writer.write_all(chunk).await?;
        }
        writer.flush().await?;
        Ok(self.queued_bytes)
    }

    /// Drop everything, returning the number of bytes thrown away
    pub fn discard(self) -> usize {
        self.queued_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flush_preserves_order() {
        let mut queue = PendingQueue::new();
        queue.push(Bytes::from_static(b"first "));
        queue.push(Bytes::new());
        queue.push(Bytes::from_static(b"second "));
        queue.push(Bytes::from_static(b"third"));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.queued_bytes(), 18);

        let mut sink = Vec::new();
        let written = queue.flush(&mut sink).await.unwrap();
        assert_eq!(written, 18);
        assert_eq!(sink, b"first second third");
    }

    #[test]
    fn test_discard() {
        let mut queue = PendingQueue::new();
        assert!(queue.is_empty());
        queue.push(Bytes::from_static(b"never sent"));
        assert_eq!(queue.discard(), 10);
    }
}
