//! WebSocket subscribe endpoint.
//!
//! ```text
//! Client A ──┐
//!             ├── /volumes/<id>/files ── VolumeRegistry ── Volume actor
//! Client B ──┘          │                                      │
//!                       │            ServerEvent (JSON)        │
//!                       ◀──────────────────────────────────────┘
//! ```
//!
//! A client upgrades `GET /volumes/<id>/files` to a WebSocket and receives
//! every committed change of that volume as a JSON-encoded `ServerEvent`,
//! in commit order. Requests without a proper upgrade handshake are
//! rejected during the handshake with a client error; malformed paths get
//! a 404 before the upgrade completes.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use crate::registry::VolumeRegistry;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9191".to_string(),
        }
    }
}

/// Server-wide statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub events_forwarded: u64,
    pub rejected_handshakes: u64,
}

/// WebSocket fan-out server over a volume registry.
pub struct VolumeServer {
    config: ServerConfig,
    registry: Arc<VolumeRegistry>,
    stats: Arc<RwLock<ServerStats>>,
}

impl VolumeServer {
    pub fn new(config: ServerConfig, registry: Arc<VolumeRegistry>) -> Self {
        Self {
            config,
            registry,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Accept connections until the task is dropped.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("volume server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            debug!("new TCP connection from {addr}");

            let registry = self.registry.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, registry, stats.clone()).await
                {
                    warn!("connection from {addr} ended with error: {e}");
                    let mut s = stats.write().await;
                    s.rejected_handshakes += 1;
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<VolumeRegistry>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Capture the request path during the upgrade handshake. A request
        // without the WebSocket upgrade headers fails accept_hdr_async
        // itself, which is the explicit client error the endpoint owes.
        let mut requested_path = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match parse_volume_path(request.uri().path()) {
                Some(volume_id) => {
                    requested_path = Some(volume_id);
                    Ok(response)
                }
                None => {
                    let mut rejection = ErrorResponse::new(Some(format!(
                        "unknown path {}; expected /volumes/<id>/files",
                        request.uri().path()
                    )));
                    *rejection.status_mut() =
                        tokio_tungstenite::tungstenite::http::StatusCode::NOT_FOUND;
                    Err(rejection)
                }
            }
        };
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
        let volume_id = requested_path.expect("handshake accepted without a volume path");

        let volume = registry.get_or_create(&volume_id).await?;
        let (subscriber_id, mut events) = volume.subscribe().await;
        info!("subscriber {subscriber_id} attached to volume {volume_id} from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        loop {
            tokio::select! {
                // Committed change events, forwarded in broadcast order.
                event = events.recv() => {
                    match event {
                        Ok(encoded) => {
                            if ws_sender.send(Message::Text(encoded.as_str().into())).await.is_err() {
                                break;
                            }
                            stats.write().await.events_forwarded += 1;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("subscriber {subscriber_id} lagged by {n} events");
                        }
                        Err(_) => break,
                    }
                }

                // Client side of the channel.
                message = ws_receiver.next() => {
                    match message {
                        Some(Ok(Message::Ping(payload))) => {
                            if ws_sender.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("subscriber {subscriber_id} disconnected");
                            break;
                        }
                        Some(Ok(other)) => {
                            debug!("ignoring unexpected frame from {addr}: {other:?}");
                        }
                        Some(Err(e)) => {
                            error!("websocket error from {addr}: {e}");
                            break;
                        }
                    }
                }
            }
        }

        volume.unsubscribe(&subscriber_id).await;
        let mut s = stats.write().await;
        s.active_connections -= 1;
        Ok(())
    }

    /// Snapshot of server counters.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// The configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// The registry this server fans out for.
    pub fn registry(&self) -> &Arc<VolumeRegistry> {
        &self.registry
    }
}

/// Extract the volume id from a `/volumes/<id>/files` path.
fn parse_volume_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/volumes/")?;
    let (volume_id, tail) = rest.split_once('/')?;
    if tail != "files" || volume_id.is_empty() {
        return None;
    }
    Some(volume_id.to_string())
}
