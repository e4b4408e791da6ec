//! Server agent
//!
//! Decrypts relay frames from local agents, dials the destination named in
//! the first decrypted bytes and relays both directions, re-encrypting the
//! destination's responses.

use super::{log_failure, AgentContext, ProxyError};
use crate::config::ServerConfig;
use crate::crypto::{CipherSession, HalfState, KeyCache, Method};
use crate::protocol::address::RELAY_FRAME_OFFSET;
use crate::protocol::{parse_address, Address, RELAY_BUFFER_SIZE};
use crate::relay::{ConnectionWatchdog, PendingQueue, RelayPipe};
use crate::transport::TcpConnector;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Server connection stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStage {
    AwaitingHeader,
    Relaying,
    Closed,
}

/// What the driver must do after feeding client bytes
#[derive(Debug)]
pub enum ServerEvent {
    /// Nothing until more client input arrives
    Pending,
    /// Dial `target`, then deliver `payload` to it first
    Connect { target: Address, payload: Bytes },
    /// Decrypted client data for the destination
    Forward(Bytes),
}

/// Relay frame state machine for one inbound connection
pub struct ServerSession {
    stage: ServerStage,
    cipher: CipherSession,
    /// Ciphertext held until the IV is complete
    raw: BytesMut,
    /// Plaintext held until the address record is complete
    header: BytesMut,
}

impl ServerSession {
    pub fn new(method: Method, keys: &KeyCache, password: &str) -> Self {
        Self {
            stage: ServerStage::AwaitingHeader,
            cipher: CipherSession::new(method, keys, password),
            raw: BytesMut::new(),
            header: BytesMut::new(),
        }
    }

    pub fn stage(&self) -> ServerStage {
        self.stage
    }

    /// Feed ciphertext read from the local agent
    pub fn on_client_data(&mut self, data: &[u8]) -> Result<ServerEvent, ProxyError> {
        match self.stage {
            ServerStage::AwaitingHeader => self.header(data),
            ServerStage::Relaying => Ok(ServerEvent::Forward(self.cipher.decrypt(data)?)),
            ServerStage::Closed => Err(ProxyError::Closed),
        }
    }

    /// Hand over the cipher state once relaying starts
    pub fn into_cipher(self) -> CipherSession {
        self.cipher
    }

    fn header(&mut self, data: &[u8]) -> Result<ServerEvent, ProxyError> {
        let plain = if self.cipher.decrypt_state() == HalfState::Unopened {
            self.raw.extend_from_slice(data);
            if self.raw.len() < self.cipher.method().iv_len() {
                return Ok(ServerEvent::Pending);
            }
            let raw = self.raw.split();
            self.decrypt(&raw)?
        } else {
            self.decrypt(data)?
        };
        self.header.extend_from_slice(&plain);

        let record = match parse_address(&self.header, RELAY_FRAME_OFFSET) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(ServerEvent::Pending),
            Err(e) => {
                self.stage = ServerStage::Closed;
                return Err(ProxyError::InvalidRequest(e));
            }
        };

        let payload = self.header.split_off(record.total_len).freeze();
        self.header.clear();
        self.stage = ServerStage::Relaying;

        Ok(ServerEvent::Connect {
            target: record.address,
            payload,
        })
    }

    fn decrypt(&mut self, data: &[u8]) -> Result<Bytes, ProxyError> {
        self.cipher.decrypt(data).map_err(|e| {
            self.stage = ServerStage::Closed;
            e.into()
        })
    }
}

/// Listener accepting relay frames from local agents
pub struct ServerAgent {
    listener: TcpListener,
    watchdog: ConnectionWatchdog,
    shared: Arc<ServerShared>,
}

struct ServerShared {
    method: Method,
    password: String,
    ctx: AgentContext,
}

impl ServerAgent {
    /// Bind with the default context, bounding destination connects by `timeout`
    pub async fn bind(config: &ServerConfig) -> Result<Self, ProxyError> {
        let ctx =
            AgentContext::default().with_connector(TcpConnector::with_timeout(config.timeout()));
        Self::bind_with(config, ctx).await
    }

    /// Bind with an explicit context
    pub async fn bind_with(config: &ServerConfig, ctx: AgentContext) -> Result<Self, ProxyError> {
        let method = config.method()?;

        let listener = TcpListener::bind((config.server_addr.as_str(), config.server_port)).await?;
        let local_addr = listener.local_addr()?;
        let udp = ctx.udp.create(local_addr, true)?;
        ctx.keys.derive(method, &config.password);

        info!("Server agent listening on {} using {}", local_addr, method);
        debug!("UDP relay at {}", udp.local_addr());

        let watchdog = ConnectionWatchdog::new(config.timeout());
        match watchdog.deadline() {
            Some(deadline) => info!("Connections are closed after {:?}", deadline),
            None => info!("Connection watchdog disabled"),
        }

        Ok(Self {
            listener,
            watchdog,
            shared: Arc::new(ServerShared {
                method,
                password: config.password.clone(),
                ctx,
            }),
        })
    }

    /// Bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until the listener fails
    pub async fn run(&self) -> Result<(), ProxyError> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    continue;
                }
            };
            debug!("New connection from {}", peer);
            stream.set_nodelay(true).ok();

            let shared = Arc::clone(&self.shared);
            let watchdog = self.watchdog;
            tokio::spawn(async move {
                let result = watchdog
                    .guard(peer, shared.serve(stream, peer))
                    .await
                    .map_err(|_| ProxyError::Timeout)
                    .and_then(|served| served);
                if let Err(e) = result {
                    log_failure(peer, &e);
                }
            });
        }
    }
}

impl ServerShared {
    async fn serve(&self, mut client: TcpStream, peer: SocketAddr) -> Result<(), ProxyError> {
        let mut session = ServerSession::new(self.method, &self.ctx.keys, &self.password);
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

        let (target, payload) = loop {
            let n = client.read(&mut buf).await?;
            if n == 0 {
                debug!("{} closed before sending a header", peer);
                return Ok(());
            }
            if let ServerEvent::Connect { target, payload } = session.on_client_data(&buf[..n])? {
                break (target, payload);
            }
        };

        info!("{} connecting to {}", peer, target);
        let mut pending = PendingQueue::new();
        pending.push(payload);

        // The client is not read again until the destination is up
        let mut dest = self
            .ctx
            .connector
            .connect(&target.host(), target.port())
            .await
            .map_err(|source| ProxyError::UpstreamConnect {
                target: target.to_string(),
                source,
            })?;
        pending.flush(&mut dest).await?;

        let (encrypt, decrypt) = session.into_cipher().into_halves();
        let stats = RelayPipe::new(client, dest).run(decrypt, encrypt).await?;
        debug!(
            "{} finished with {}: {} bytes up, {} bytes down",
            peer, target, stats.a_to_b, stats.b_to_a
        );

        Ok(())
    }
}
