//! WebSocket Server
//!
//! Accept loop and per-connection plumbing. Each accepted socket gets a
//! reader task and a writer task; parsed frames are forwarded to the
//! coordinator over its event channel, and the writer drains a
//! per-connection mpsc of outbound messages. Admin frames are verified
//! against the configured admin secret before they reach the
//! coordinator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::network::auth::AdminAuth;
use crate::network::coordinator::{ClientHandle, Coordinator, CoordinatorEvent};
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::quiz::question::{load_questions, Question};
use crate::quiz::SessionStore;

/// Server configuration, populated from the environment in production.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub bind_addr: String,
    /// Cap on concurrently open connections.
    pub max_connections: usize,
    /// Optional question bank file. Falls back to the built-in bank.
    pub questions_path: Option<PathBuf>,
    /// HMAC secret for admin tokens. None disables admin verification.
    pub admin_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".to_string(),
            max_connections: 1024,
            questions_path: None,
            admin_secret: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from `QUIZ_*` environment variables, with
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("QUIZ_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("QUIZ_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            questions_path: std::env::var("QUIZ_QUESTIONS_PATH").ok().map(PathBuf::from),
            admin_secret: std::env::var("QUIZ_ADMIN_SECRET").ok().filter(|s| !s.is_empty()),
        }
    }
}

/// Errors from server startup and the accept loop.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),

    /// WebSocket handshake or transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The quiz server: owns the listener, spawns the coordinator, and
/// tracks the live connection count.
pub struct QuizServer {
    config: ServerConfig,
    auth: AdminAuth,
    question_bank: Vec<Question>,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl QuizServer {
    /// Build a server from configuration, loading the question bank
    /// eagerly so a bad file is reported at startup.
    pub fn new(config: ServerConfig) -> Self {
        let auth = AdminAuth::new(config.admin_secret.clone());
        let question_bank = load_questions(config.questions_path.as_deref());
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            auth,
            question_bank,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// A handle that stops the accept loop when triggered.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind and serve until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            questions = self.question_bank.len(),
            admin_auth = self.auth.is_enabled(),
            "quiz server listening"
        );

        let (events_tx, events_rx) = mpsc::channel::<CoordinatorEvent>(256);
        let coordinator = Coordinator::new(
            SessionStore::new(),
            self.question_bank.clone(),
            events_tx.clone(),
        );
        tokio::spawn(coordinator.run(events_rx));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let open = self.connections.load(Ordering::Relaxed);
                    if open >= self.config.max_connections {
                        warn!(%peer, open, "connection limit reached, dropping");
                        continue;
                    }

                    self.connections.fetch_add(1, Ordering::Relaxed);
                    let connections = Arc::clone(&self.connections);
                    let events_tx = events_tx.clone();
                    let auth = self.auth.clone();
                    tokio::spawn(async move {
                        let conn_id = Uuid::new_v4();
                        debug!(%peer, %conn_id, "connection accepted");
                        if let Err(e) = handle_connection(stream, conn_id, events_tx.clone(), auth).await {
                            debug!(%conn_id, error = %e, "connection closed with error");
                        }
                        let _ = events_tx
                            .send(CoordinatorEvent::Disconnected { conn_id })
                            .await;
                        connections.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Serve one WebSocket connection until it closes.
async fn handle_connection(
    stream: TcpStream,
    conn_id: Uuid,
    events_tx: mpsc::Sender<CoordinatorEvent>,
    auth: AdminAuth,
) -> Result<(), ServerError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            match message.to_json() {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!(%conn_id, error = %e, "outbound serialization failed"),
            }
        }
        let _ = ws_tx.close().await;
    });

    let client = ClientHandle {
        conn_id,
        sender: out_tx,
    };

    while let Some(frame) = ws_rx.next().await {
        let frame = frame?;
        match frame {
            Message::Text(text) => {
                let message = match ClientMessage::from_json(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!(%conn_id, error = %e, "unparseable frame");
                        client
                            .send(ServerMessage::Error {
                                message: "malformed message".to_string(),
                            })
                            .await;
                        continue;
                    }
                };

                // Admin operations never reach the coordinator without
                // a valid token.
                if message.is_admin() {
                    if let Err(e) = auth.verify(message.admin_token()) {
                        warn!(%conn_id, error = %e, "admin frame rejected");
                        client
                            .send(ServerMessage::Error {
                                message: "unauthorized".to_string(),
                            })
                            .await;
                        continue;
                    }
                }

                if events_tx
                    .send(CoordinatorEvent::Frame {
                        client: client.clone(),
                        message,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
            _ => debug!(%conn_id, "ignoring non-text frame"),
        }
    }

    writer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.max_connections, 1024);
        assert!(config.questions_path.is_none());
        assert!(config.admin_secret.is_none());
    }

    #[test]
    fn test_server_loads_builtin_bank_without_path() {
        let server = QuizServer::new(ServerConfig::default());
        assert_eq!(server.question_bank.len(), 3);
        assert!(!server.auth.is_enabled());
    }

    #[test]
    fn test_server_with_secret_enables_auth() {
        let server = QuizServer::new(ServerConfig {
            admin_secret: Some("s3cret".to_string()),
            ..ServerConfig::default()
        });
        assert!(server.auth.is_enabled());
    }
}
