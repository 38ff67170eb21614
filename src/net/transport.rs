//! WebTransport server implementation
//!
//! One bidirectional control stream per client carries framed messages
//! both ways; datagrams carry steering only.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, RwLock};

use crate::config::ServerConfig;
use crate::game::constants::net::MAX_CLIENT_MESSAGE_SIZE;
use crate::metrics::Metrics;
use crate::net::framing::{self, FramingError};
use crate::net::game_session::{start_game_loop, ConnectionId, Disposition, GameSession};
use crate::net::protocol::{decode, ClientMessage, ServerMessage};
use crate::net::tls::TlsConfig;

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    game_session: Arc<RwLock<GameSession>>,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    /// Create a new WebTransport server
    pub async fn new(
        config: ServerConfig,
        game_session: Arc<RwLock<GameSession>>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;

        Ok(Self {
            config,
            tls_config,
            game_session,
            metrics,
        })
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls_config.get_cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Run the server
    pub async fn run(self) -> anyhow::Result<()> {
        use wtransport::Endpoint;

        let bind_addr = self.bind_addr();
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_address(bind_addr)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;

        tracing::info!("WebTransport server listening on {}", bind_addr);

        // Start the room tick background task
        start_game_loop(self.game_session.clone(), self.metrics.clone());

        // Accept connections
        loop {
            let incoming = server.accept().await;
            let game_session = self.game_session.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, game_session, metrics).await {
                    tracing::warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single WebTransport connection
async fn handle_connection(
    incoming: wtransport::endpoint::IncomingSession,
    game_session: Arc<RwLock<GameSession>>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    tracing::debug!(
        "New connection from: {:?}, path: {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    let (send, recv) = connection.accept_bi().await?;

    let (outbox, inbox) = mpsc::unbounded_channel();
    let connection_id = game_session.write().await.connect(outbox);
    tracing::debug!("Connection accepted (conn_id: {})", connection_id);

    let writer = tokio::spawn(write_loop(send, inbox));

    tokio::select! {
        _ = read_loop(recv, connection_id, game_session.clone(), metrics.clone()) => {}
        _ = datagram_loop(&connection, connection_id, game_session.clone(), metrics) => {}
    }

    // Dropping the outbox lets the writer flush what is queued and stop
    game_session.write().await.disconnect(connection_id);
    if let Err(e) = writer.await {
        tracing::debug!("Writer task failed: {}", e);
    }

    tracing::debug!("Connection closed (conn_id: {})", connection_id);
    Ok(())
}

/// Decode framed client messages until the stream ends or asks to close
async fn read_loop<R: AsyncRead + Unpin>(
    mut recv: R,
    connection_id: ConnectionId,
    game_session: Arc<RwLock<GameSession>>,
    metrics: Arc<Metrics>,
) {
    loop {
        let message: ClientMessage = match framing::read_message(&mut recv, MAX_CLIENT_MESSAGE_SIZE).await {
            Ok(message) => message,
            Err(e) if e.is_recoverable() => {
                metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Failed to decode client message: {}", e);
                continue;
            }
            Err(FramingError::ConnectionClosed) => break,
            Err(e) => {
                tracing::debug!("Stream read error: {}", e);
                break;
            }
        };

        let disposition = game_session.write().await.handle_message(connection_id, message);
        if disposition == Disposition::Close {
            break;
        }
    }
}

/// Steering over unreliable datagrams
async fn datagram_loop(
    connection: &wtransport::Connection,
    connection_id: ConnectionId,
    game_session: Arc<RwLock<GameSession>>,
    metrics: Arc<Metrics>,
) {
    loop {
        let datagram = match connection.receive_datagram().await {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::debug!("Datagram receive error: {}", e);
                break;
            }
        };

        if framing::validate_datagram_size(&datagram).is_err() {
            continue;
        }
        match decode::<ClientMessage>(&datagram) {
            Ok(message @ ClientMessage::Steer(_)) => {
                game_session.write().await.handle_message(connection_id, message);
            }
            Ok(_) => tracing::debug!("Ignoring non-steer datagram"),
            Err(e) => {
                metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Failed to decode datagram: {}", e);
            }
        }
    }
}

/// Drain a connection's outbox onto its stream
async fn write_loop<W: AsyncWrite + Unpin>(mut send: W, mut inbox: mpsc::UnboundedReceiver<ServerMessage>) {
    while let Some(message) = inbox.recv().await {
        match framing::write_message(&mut send, &message).await {
            Ok(()) => {}
            // Nothing was written, so the stream is still aligned
            Err(FramingError::MessageTooLarge(len, max)) => {
                tracing::warn!("Dropping oversized outbound message ({} > {} bytes)", len, max);
            }
            Err(e) => {
                tracing::debug!("Stream write error: {}", e);
                return;
            }
        }
    }
    if let Err(e) = send.shutdown().await {
        tracing::debug!("Stream shutdown error: {}", e);
    }
}
