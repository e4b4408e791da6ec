//! Plain TCP connector

use super::{Connector, TransportError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::trace;

/// Connects directly, resolving names through the system resolver
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// Connector without a connect deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on connects that take longer than `timeout`; zero means never
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: (!timeout.is_zero()).then_some(timeout),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        let connect = TcpStream::connect((host, port));

        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => connect.await,
        }
        .map_err(|e| TransportError::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;

        stream.set_nodelay(true).ok();
        trace!("Connected to {}:{}", host, port);

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connector() {
        // Start a simple echo server
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let connector = TcpConnector::with_timeout(Duration::from_secs(5));
        let mut stream = connector.connect("127.0.0.1", addr.port()).await.unwrap();
        assert!(stream.nodelay().unwrap());

        let msg = b"Hello, TCP!";
        stream.write_all(msg).await.unwrap();

        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], msg);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Grab a free port, then close it again
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpConnector::new().connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_connect_is_bounded() {
        // Non-routable; either times out or fails fast, never hangs
        let connector = TcpConnector::with_timeout(Duration::from_millis(100));
        let result =
            tokio::time::timeout(Duration::from_secs(2), connector.connect("10.255.255.1", 80))
                .await
                .expect("connect outlived its deadline");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let connector = TcpConnector::with_timeout(Duration::ZERO);
        assert!(connector.connect_timeout.is_none());
    }
}
