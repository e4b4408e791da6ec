//! Local agent (SOCKS5 front-end, RFC 1928)
//!
//! Negotiates with the client, then carries its stream to the server agent
//! inside an encrypted relay frame whose first plaintext bytes are the
//! requested address record.

use super::{
    log_failure, AgentContext, DestinationFilter, HostBlocklist, ProxyError, UdpRelayHandle,
};
use crate::config::LocalConfig;
use crate::crypto::{CipherSession, KeyCache, Method};
use crate::protocol::address::SOCKS_REQUEST_OFFSET;
use crate::protocol::socks5::{self, AuthMethod, Command, Reply, SOCKS_VERSION};
use crate::protocol::{parse_address, Address, ProtocolError, RELAY_BUFFER_SIZE};
use crate::relay::{PendingQueue, RelayPipe};
use crate::transport::TcpConnector;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Client bytes held while the server connect is in flight before the
/// client stops being read
pub const PENDING_LIMIT: usize = RELAY_BUFFER_SIZE;

/// Local connection stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStage {
    AwaitingMethod,
    AwaitingRequest,
    Relaying,
    UdpAssociated,
    Closed,
}

/// What the driver must do after feeding client bytes
#[derive(Debug)]
pub enum LocalEvent {
    /// Nothing until more client input arrives
    Pending,
    /// Send the method reply; negotiation succeeded
    MethodAccepted(Bytes),
    /// Send the UDP-associate reply; the TCP connection only stays open
    UdpAssociated(Bytes),
    /// Connect to the server agent. `first_chunk` is the encrypted head of
    /// the relay frame and must be the first thing written to it.
    Connect { target: Address, first_chunk: Bytes },
    /// Encrypted client data for the server agent
    Forward(Bytes),
}

/// SOCKS5 state machine for one client connection
pub struct LocalSession {
    stage: LocalStage,
    buffer: BytesMut,
    cipher: CipherSession,
    filter: Arc<dyn DestinationFilter>,
    udp_bound: SocketAddr,
}

impl LocalSession {
    pub fn new(
        method: Method,
        keys: &KeyCache,
        password: &str,
        filter: Arc<dyn DestinationFilter>,
        udp_bound: SocketAddr,
    ) -> Self {
        Self {
            stage: LocalStage::AwaitingMethod,
            buffer: BytesMut::new(),
            cipher: CipherSession::new(method, keys, password),
            filter,
            udp_bound,
        }
    }

    pub fn stage(&self) -> LocalStage {
        self.stage
    }

    /// Feed bytes read from the client.
    ///
    /// Handshake records may be split or pipelined arbitrarily; after any
    /// event other than [`LocalEvent::Pending`], call again with an empty
    /// slice to process input that is already buffered.
    pub fn on_client_data(&mut self, data: &[u8]) -> Result<LocalEvent, ProxyError> {
        match self.stage {
            LocalStage::AwaitingMethod => {
                self.buffer.extend_from_slice(data);
                self.negotiate()
            }
            LocalStage::AwaitingRequest => {
                self.buffer.extend_from_slice(data);
                self.request()
            }
            LocalStage::Relaying if data.is_empty() => Ok(LocalEvent::Pending),
            LocalStage::Relaying => Ok(LocalEvent::Forward(self.cipher.encrypt(data)?)),
            // Datagrams travel over the UDP relay
            LocalStage::UdpAssociated => Ok(LocalEvent::Pending),
            LocalStage::Closed => Err(ProxyError::Closed),
        }
    }

    /// Hand over the cipher state once relaying starts
    pub fn into_cipher(self) -> CipherSession {
        self.cipher
    }

    fn negotiate(&mut self) -> Result<LocalEvent, ProxyError> {
        if self.buffer.len() < 2 {
            return Ok(LocalEvent::Pending);
        }
        if self.buffer[0] != SOCKS_VERSION {
            return Err(ProtocolError::InvalidSocksVersion(self.buffer[0]).into());
        }

        let record_len = 2 + self.buffer[1] as usize;
        if self.buffer.len() < record_len {
            return Ok(LocalEvent::Pending);
        }

        let greeting = self.buffer.split_to(record_len);
        if !greeting[2..].contains(&(AuthMethod::NoAuth as u8)) {
            return Err(ProxyError::NoAcceptableMethod);
        }

        self.stage = LocalStage::AwaitingRequest;
        Ok(LocalEvent::MethodAccepted(socks5::method_reply(AuthMethod::NoAuth)))
    }

    fn request(&mut self) -> Result<LocalEvent, ProxyError> {
        if self.buffer.is_empty() {
            return Ok(LocalEvent::Pending);
        }
        if self.buffer[0] != SOCKS_VERSION {
            return Err(ProxyError::InvalidRequest(ProtocolError::InvalidSocksVersion(
                self.buffer[0],
            )));
        }

        let Some(record) =
            parse_address(&self.buffer, SOCKS_REQUEST_OFFSET).map_err(ProxyError::InvalidRequest)?
        else {
            return Ok(LocalEvent::Pending);
        };

        if !self.filter.allow(&record) {
            self.stage = LocalStage::Closed;
            self.buffer.clear();
            return Err(ProxyError::PolicyRejected(record.address.to_string()));
        }

        let command = self.buffer[1];
        match Command::from_byte(command) {
            Some(Command::Connect) => {
                // Address record plus anything pipelined behind it
                let request = self.buffer.split();
                let first_chunk = self.cipher.encrypt(&request[SOCKS_REQUEST_OFFSET..])?;
                self.stage = LocalStage::Relaying;
                Ok(LocalEvent::Connect {
                    target: record.address,
                    first_chunk,
                })
            }
            Some(Command::UdpAssociate) => {
                self.buffer.clear();
                self.stage = LocalStage::UdpAssociated;
                Ok(LocalEvent::UdpAssociated(socks5::make_reply(
                    Reply::Succeeded,
                    self.udp_bound,
                )))
            }
            _ => Err(ProxyError::UnsupportedCommand(command)),
        }
    }
}

/// SOCKS5 listener forwarding to a server agent
pub struct LocalAgent {
    listener: TcpListener,
    shared: Arc<LocalShared>,
}

struct LocalShared {
    server_host: String,
    server_port: u16,
    method: Method,
    password: String,
    udp: Arc<dyn UdpRelayHandle>,
    ctx: AgentContext,
}

impl LocalAgent {
    /// Bind with the default context, blocking `blocked_hosts` if any are
    /// configured and bounding server connects by `timeout`
    pub async fn bind(config: &LocalConfig) -> Result<Self, ProxyError> {
        let mut ctx =
            AgentContext::default().with_connector(TcpConnector::with_timeout(config.timeout()));
        if !config.blocked_hosts.is_empty() {
            ctx = ctx.with_filter(HostBlocklist::new(&config.blocked_hosts));
        }
        Self::bind_with(config, ctx).await
    }

    /// Bind with an explicit context
    pub async fn bind_with(config: &LocalConfig, ctx: AgentContext) -> Result<Self, ProxyError> {
        let method = config.method()?;

        let listener = TcpListener::bind((config.local_addr.as_str(), config.local_port)).await?;
        let local_addr = listener.local_addr()?;
        let udp = ctx.udp.create(local_addr, false)?;

        // Warm the cache so the first connection does not pay for it
        ctx.keys.derive(method, &config.password);

        info!("SOCKS5 agent listening on {}", local_addr);
        info!(
            "Forwarding to {}:{} using {}",
            config.server_addr, config.server_port, method
        );

        Ok(Self {
            listener,
            shared: Arc::new(LocalShared {
                server_host: config.server_addr.clone(),
                server_port: config.server_port,
                method,
                password: config.password.clone(),
                udp,
                ctx,
            }),
        })
    }

    /// Bound SOCKS5 address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address reported in UDP-associate replies
    pub fn udp_relay_addr(&self) -> SocketAddr {
        self.shared.udp.local_addr()
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
            debug!("New SOCKS5 connection from {}", peer);
            stream.set_nodelay(true).ok();

            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                if let Err(e) = shared.serve(stream, peer).await {
                    log_failure(peer, &e);
                }
            });
        }
    }
}

impl LocalShared {
    async fn serve(&self, mut client: TcpStream, peer: SocketAddr) -> Result<(), ProxyError> {
        let mut session = LocalSession::new(
            self.method,
            &self.ctx.keys,
            &self.password,
            Arc::clone(&self.ctx.filter),
            self.udp.local_addr(),
        );
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        let mut pending = PendingQueue::new();

        let target = 'handshake: loop {
            let n = client.read(&mut buf).await?;
            if n == 0 {
                debug!("{} closed during handshake", peer);
                return Ok(());
            }

            let mut input: &[u8] = &buf[..n];
            loop {
                let event = match session.on_client_data(input) {
                    Ok(event) => event,
                    Err(e) => {
                        if let Some(reply) = e.socks_reply() {
                            client.write_all(&reply).await.ok();
                        }
                        return Err(e);
                    }
                };
                input = &[];

                match event {
                    LocalEvent::Pending => break,
                    LocalEvent::MethodAccepted(reply) => client.write_all(&reply).await?,
                    LocalEvent::UdpAssociated(reply) => {
                        client.write_all(&reply).await?;
                        debug!("{} associated with UDP relay {}", peer, self.udp.local_addr());
                        return drain(client).await;
                    }
                    LocalEvent::Connect {
                        target,
                        first_chunk,
                    } => {
                        pending.push(first_chunk);
                        break 'handshake target;
                    }
                    LocalEvent::Forward(chunk) => pending.push(chunk),
                }
            }
        };

        info!("{} connecting to {}", peer, target);

        // Keep reading the client while the server connect is in flight,
        // until the queue is full
        let connect = self.connect_remote();
        tokio::pin!(connect);
        let mut remote = loop {
            tokio::select! {
                result = &mut connect => break result?,
                read = client.read(&mut buf), if pending.queued_bytes() < PENDING_LIMIT => {
                    let n = read?;
                    if n == 0 {
                        let dropped = pending.discard();
                        debug!("{} left before the server connected, dropped {} bytes", peer, dropped);
                        return Ok(());
                    }
                    if let LocalEvent::Forward(chunk) = session.on_client_data(&buf[..n])? {
                        pending.push(chunk);
                    }
                }
            }
        };

        let bound = remote.local_addr()?;
        client.write_all(&socks5::connect_reply(bound)).await?;
        pending.flush(&mut remote).await?;

        let (encrypt, decrypt) = session.into_cipher().into_halves();
        let stats = RelayPipe::new(client, remote).run(encrypt, decrypt).await?;
        debug!(
            "{} finished with {}: {} bytes sent, {} bytes received",
            peer, target, stats.a_to_b, stats.b_to_a
        );

        Ok(())
    }

    async fn connect_remote(&self) -> Result<TcpStream, ProxyError> {
        self.ctx
            .connector
            .connect(&self.server_host, self.server_port)
            .await
            .map_err(|source| ProxyError::UpstreamConnect {
                target: format!("{}:{}", self.server_host, self.server_port),
                source,
            })
    }
}

/// Hold a UDP-associate control connection open until the client closes it
async fn drain(mut client: TcpStream) -> Result<(), ProxyError> {
    let mut buf = [0u8; 512];
    while client.read(&mut buf).await? > 0 {}
    Ok(())
}
