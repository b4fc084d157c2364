//! WebTransport server implementation
//!
//! Each bidirectional stream gets its own outbound queue and writer task;
//! the read side feeds decoded messages to the session service. Datagrams
//! carry position reports only.

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wtransport::endpoint::IncomingSession;
use wtransport::{Endpoint, RecvStream, SendStream};

use crate::config::ServerConfig;
use crate::game::session::GameError;
use crate::game::state::PlayerId;
use crate::net::broadcast::ConnectionId;
use crate::net::framing::{pump_outbound, validate_datagram_size, FrameReader, FramingError};
use crate::net::game_session::SessionService;
use crate::net::protocol::{decode_client, ClientMessage};
use crate::net::tls::TlsConfig;
use crate::store::PersistenceGateway;
use crate::util::vec2::Vec2;

/// Player id a WebTransport connection is currently speaking for
type Binding = Arc<RwLock<Option<PlayerId>>>;

pub struct ArenaServer<P> {
    config: ServerConfig,
    tls_config: TlsConfig,
    service: SessionService<P>,
}

impl<P: PersistenceGateway> ArenaServer<P> {
    pub async fn new(config: ServerConfig, service: SessionService<P>) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;
        Ok(Self {
            config,
            tls_config,
            service,
        })
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        &self.tls_config.cert_hash
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Accept sessions until the endpoint fails
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.bind_addr();
        let builder = wtransport::ServerConfig::builder();
        // Unspecified address binds dual-stack so both IPv4 and IPv6 clients can reach us
        let builder = if self.config.bind_address.is_unspecified() {
            builder.with_bind_default(self.config.port)
        } else {
            builder.with_bind_address(addr)
        };
        let server_config = builder.with_identity(self.tls_config.identity).build();

        let server = Endpoint::server(server_config)?;
        info!("WebTransport server listening on {}", addr);

        loop {
            let incoming = server.accept().await;
            let service = self.service.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, service).await {
                    warn!("Connection error: {}", e);
                }
            });
        }
    }
}

async fn handle_connection<P: PersistenceGateway>(
    incoming: IncomingSession,
    service: SessionService<P>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    debug!(
        "New session from {:?}, path: {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    service.metrics().connections_active.fetch_add(1, Ordering::Relaxed);

    let binding: Binding = Arc::new(RwLock::new(None));

    loop {
        tokio::select! {
            stream = connection.accept_bi() => {
                match stream {
                    Ok((send, recv)) => {
                        tokio::spawn(serve_stream(service.clone(), binding.clone(), send, recv));
                    }
                    Err(e) => {
                        debug!("Stream accept error: {}", e);
                        break;
                    }
                }
            }

            datagram = connection.receive_datagram() => {
                match datagram {
                    Ok(data) => {
                        spawn_datagram(service.clone(), data);
                    }
                    Err(e) => {
                        debug!("Datagram receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    release_binding(&service, &binding).await;
    service.metrics().connections_active.fetch_sub(1, Ordering::Relaxed);
    debug!("Connection closed");
    Ok(())
}

/// Read frames from one stream until it closes
async fn serve_stream<P: PersistenceGateway>(
    service: SessionService<P>,
    binding: Binding,
    send: SendStream,
    recv: RecvStream,
) {
    let (conn, outbound) = service.connections().register();
    let writer = tokio::spawn(pump_outbound(send, outbound));
    let mut reader = FrameReader::new(recv);

    loop {
        match reader.next_frame().await {
            Ok(frame) => handle_frame(&service, conn, &binding, frame).await,
            Err(FramingError::ConnectionClosed) => {
                debug!("Stream {} closed by peer", conn);
                break;
            }
            Err(e) => {
                warn!("Closing stream {}: {}", conn, e);
                break;
            }
        }
    }

    // Dropping the queue lets the writer finish
    service.connections().unregister(conn);
    release_binding(&service, &binding).await;

    match writer.await {
        Ok(Ok(frames)) => debug!("Stream {} writer done after {} frames", conn, frames),
        Ok(Err(e)) => debug!("Stream {} writer stopped: {}", conn, e),
        Err(e) => warn!("Stream {} writer task failed: {}", conn, e),
    }
}

async fn handle_frame<P: PersistenceGateway>(
    service: &SessionService<P>,
    conn: ConnectionId,
    binding: &RwLock<Option<PlayerId>>,
    frame: &[u8],
) {
    service.metrics().record_received(frame.len());

    let message = match decode_client(frame) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropped message on stream {}: {}", conn, e);
            service.metrics().malformed_messages.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    if let Some(id) = service.handle_message(conn, message).await {
        *binding.write().await = Some(id);
    }
}

/// Handle one datagram on its own task. A position report that wins the round
/// waits on the store, and that wait must not hold up the connection loop.
fn spawn_datagram<P, D>(service: SessionService<P>, data: D) -> JoinHandle<()>
where
    P: PersistenceGateway,
    D: Deref<Target = [u8]> + Send + Sync + 'static,
{
    tokio::spawn(async move { handle_datagram(&service, &data).await })
}

async fn handle_datagram<P: PersistenceGateway>(service: &SessionService<P>, data: &[u8]) {
    if let Err(e) = validate_datagram_size(data) {
        debug!("Dropped datagram: {}", e);
        return;
    }
    service.metrics().record_received(data.len());

    match decode_client(data) {
        Ok(ClientMessage::Position { id, x, y }) => {
            if let Err(e) = service.report_position(id, Vec2::new(x, y)).await {
                match e {
                    GameError::UnknownPlayer(_) => warn!("Dropped datagram position: {}", e),
                    _ => debug!("Dropped datagram position: {}", e),
                }
            }
        }
        Ok(_) => debug!("Ignoring non-position datagram"),
        Err(e) => {
            debug!("Failed to decode datagram: {}", e);
            service.metrics().malformed_messages.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Remove the bound player, if any. Safe to call from every stream and the
/// connection itself; only the first caller sees the id.
async fn release_binding<P: PersistenceGateway>(service: &SessionService<P>, binding: &RwLock<Option<PlayerId>>) {
    let bound = binding.write().await.take();
    if let Some(id) = bound {
        debug!("Removing player {} after disconnect", id);
        service.disconnect(id).await;
    }
}
