//! WebSocket Feed Server
//!
//! Streams round snapshots, transition events, and crash history to
//! presentation clients. Clients can only read; nothing they send touches
//! the round session.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::game::state::RoundSnapshot;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage, WelcomeInfo};
use crate::network::session::RoundReader;

/// Feed server errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
struct ConnectedClient {
    /// Connection time.
    connected_at: Instant,
    /// Snapshots go out as binary frames.
    binary: bool,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The feed server.
pub struct FeedServer {
    /// Server configuration.
    config: ServerConfig,
    /// Read side of the round session.
    rounds: RoundReader,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl FeedServer {
    /// Create a new feed server over a round session.
    pub fn new(config: ServerConfig, rounds: RoundReader) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            rounds,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), FeedServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener until shutdown.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), FeedServerError> {
        info!("Feed server listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            // Reserve the slot before the handshake so a burst can't overshoot the cap
                            {
                                let mut clients = self.clients.write().await;
                                if clients.len() >= self.config.max_connections {
                                    warn!("{}, rejecting {}", FeedServerError::ConnectionLimitReached, addr);
                                    continue;
                                }
                                clients.insert(addr, ConnectedClient {
                                    connected_at: Instant::now(),
                                    binary: false,
                                });
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let rounds = self.rounds.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, FeedServerError::from(e));
                    clients.write().await.remove(&addr);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(64);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    if ws_sender.send(msg).await.is_err() {
                        break;
                    }
                }
            });

            let welcome = ServerMessage::Welcome(WelcomeInfo {
                server_version: config.version.clone(),
                snapshot: rounds.snapshot(),
                history: rounds.history(),
            });
            send_json(&msg_tx, &welcome).await;

            let mut events = rounds.subscribe_events();
            let mut session_stop = rounds.watch_shutdown();
            let mut session_running = !rounds.is_shut_down();
            let mut snapshot_ticker = interval(config.snapshot_period());
            snapshot_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_sent: Option<RoundSnapshot> = None;

            while session_running {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(addr, client_msg, &clients, &rounds, &msg_tx).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        send_json(&msg_tx, &ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = snapshot_ticker.tick() => {
                        let snapshot = rounds.snapshot();
                        if last_sent != Some(snapshot) {
                            let binary = is_binary(&clients, &addr).await;
                            send_snapshot(&msg_tx, snapshot, binary).await;
                            last_sent = Some(snapshot);
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) => send_json(&msg_tx, &ServerMessage::Event(event)).await,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!("Client {} lagged {} events", addr, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                session_running = false;
                            }
                        }
                    }
                    changed = session_stop.changed() => {
                        if changed.is_err() || *session_stop.borrow() {
                            session_running = false;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        send_json(&msg_tx, &ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            if !session_running {
                info!("Round session stopped, closing feed for {}", addr);
                send_json(&msg_tx, &ServerMessage::Shutdown {
                    reason: "Round session stopped".to_string(),
                }).await;
            }

            // Let queued messages flush before tearing down
            drop(msg_tx);
            let _ = sender_task.await;

            if let Some(client) = clients.write().await.remove(&addr) {
                info!("Client {} cleaned up after {:?}", addr, client.connected_at.elapsed());
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &ClientMap,
        rounds: &RoundReader,
        sender: &mpsc::Sender<Message>,
    ) {
        match msg {
            ClientMessage::SyncRequest => {
                let binary = is_binary(clients, &addr).await;
                send_snapshot(sender, rounds.snapshot(), binary).await;
            }
            ClientMessage::HistoryRequest { limit } => {
                let mut values = rounds.history();
                if let Some(limit) = limit {
                    values.truncate(limit);
                }
                send_json(sender, &ServerMessage::History { values }).await;
            }
            ClientMessage::SetEncoding { binary } => {
                if let Some(client) = clients.write().await.get_mut(&addr) {
                    client.binary = binary;
                }
                debug!("Client {} switched to {} snapshots", addr, if binary { "binary" } else { "json" });
            }
            ClientMessage::Ping { timestamp } => {
                send_json(sender, &ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
                }).await;
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

async fn is_binary(clients: &ClientMap, addr: &SocketAddr) -> bool {
    clients.read().await.get(addr).map(|c| c.binary).unwrap_or(false)
}

async fn send_json(sender: &mpsc::Sender<Message>, msg: &ServerMessage) {
    match msg.to_json() {
        Ok(text) => {
            let _ = sender.send(Message::Text(text)).await;
        }
        Err(e) => error!("Failed to serialize message: {}", e),
    }
}

async fn send_snapshot(sender: &mpsc::Sender<Message>, snapshot: RoundSnapshot, binary: bool) {
    if !binary {
        send_json(sender, &ServerMessage::Snapshot(snapshot)).await;
        return;
    }
    match snapshot.to_bytes() {
        Ok(bytes) => {
            let _ = sender.send(Message::Binary(bytes)).await;
        }
        Err(e) => error!("Failed to encode snapshot: {}", e),
    }
}
