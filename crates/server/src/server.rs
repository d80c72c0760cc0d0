//! File service WebSocket server.
//!
//! Listens on a TCP port, upgrades each connection to WebSocket and runs it
//! until the client leaves or the server shuts down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;

use filesvc_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::ServerError;
use crate::config::ServerConfig;
use crate::connection::{self, ClientConnection};
use crate::handler::Handler;

/// The file service WebSocket server.
///
/// Serves any number of concurrent connections and dispatches their
/// messages to one shared [`Handler`].
pub struct FileServer<H: Handler> {
    bind: SocketAddr,
    handler: Arc<H>,
    connections: Mutex<Vec<ClientConnection>>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    accept: AtomicBool,
}

impl<H: Handler> FileServer<H> {
    /// Creates a new server with the given handler.
    ///
    /// Fails with [`ServerError::InvalidConfig`] if `config` advertises limits
    /// no client could honour.
    pub fn new(config: &ServerConfig, handler: H) -> Result<Arc<Self>, ServerError> {
        config.validate()?;
        Ok(Arc::new(Self {
            bind: config.bind_addr(),
            handler: Arc::new(handler),
            connections: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            accept: AtomicBool::new(config.accept_connections),
        }))
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Number of live client connections.
    pub async fn connection_count(&self) -> usize {
        let mut conns = self.connections.lock().await;
        conns.retain(|c| !c.is_closed() && c.sender().is_connected());
        conns.len()
    }

    /// Starts or stops accepting new connections. Existing ones stay open.
    pub fn set_accept_connections(&self, accept: bool) {
        self.accept.store(accept, Ordering::Relaxed);
    }

    pub fn accepts_connections(&self) -> bool {
        self.accept.load(Ordering::Relaxed)
    }

    /// Closes every client connection. Their in-flight streams fail.
    pub async fn disconnect_all(&self) {
        let conns = std::mem::take(&mut *self.connections.lock().await);
        for conn in conns {
            conn.close();
        }
    }

    /// Gracefully shuts down the server and all of its connections.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = {
            let mut local = self.local_addr.lock().await;
            if local.is_some() {
                return Err(ServerError::AlreadyRunning);
            }
            let listener = TcpListener::bind(self.bind).await?;
            *local = Some(listener.local_addr()?);
            listener
        };
        tracing::info!(addr = %listener.local_addr()?, "file server listening");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    self.disconnect_all().await;
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::warn!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades one TCP connection to WS and registers it.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        if !self.accepts_connections() {
            tracing::warn!(%peer_addr, "rejecting connection: not accepting");
            return Err(ServerError::ConnectionRejected);
        }

        // Frame limits match the protocol constants.
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
        tracing::info!(%peer_addr, "WebSocket connection established");

        let conn = connection::spawn_connection(
            ws_stream,
            peer_addr,
            Arc::clone(&self.handler),
            &self.cancel,
        );

        let mut conns = self.connections.lock().await;
        conns.retain(|c| !c.is_closed() && c.sender().is_connected());
        conns.push(conn);
        Ok(())
    }
}
