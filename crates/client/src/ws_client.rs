//! WebSocket client for the file service.
//!
//! Implements request-response correlation by message id, routing of
//! download chunk frames, and ping/pong keepalive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use filesvc_protocol::ProtocolVersion;
use filesvc_protocol::constants::{MessageType, WS_MAX_MESSAGE_SIZE};
use filesvc_protocol::envelope::Message;
use filesvc_protocol::messages::{ConstraintsResponse, DownloadRequest, UploadOpenRequest};
use filesvc_transfer::{ChannelSource, Constraints, ConstraintsSource, TransferError, TransferFuture};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::router::Router;
use crate::stream::UploadStream;

/// Outbound frames queued ahead of the socket.
const WRITE_QUEUE_DEPTH: usize = 16;

/// Download chunks buffered ahead of the reader.
const DOWNLOAD_QUEUE_DEPTH: usize = 8;

/// WebSocket client connected to one file server.
///
/// Unary requests time out after the configured timeout. Upload results and
/// download streams do not: they complete when the server says so or the
/// connection drops.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    router: Arc<Router>,
    timeout: Duration,
    cancel: CancellationToken,
    _read_handle: JoinHandle<()>,
    _write_handle: JoinHandle<()>,
    _ping_handle: JoinHandle<()>,
}

impl WsClient {
    /// Connects to the server at `config.addr`.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let connect = tokio_tungstenite::connect_async_with_config(
            config.addr.as_str(),
            Some(ws_config),
            false,
        );
        let (ws_stream, _) = tokio::time::timeout(config.timeout(), connect)
            .await
            .map_err(|_| ClientError::Timeout)??;
        debug!(addr = %config.addr, "connected");

        let (write, read) = ws_stream.split();
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let router = Arc::new(Router::default());
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(crate::pumps::write::write_pump(
            write,
            write_rx,
            cancel.clone(),
        ));
        let read_handle = tokio::spawn(crate::pumps::read::read_pump(
            read,
            Arc::clone(&router),
            write_tx.clone(),
            cancel.clone(),
        ));
        let ping_handle = tokio::spawn(crate::pumps::ping::ping_pump(
            write_tx.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            write_tx,
            router,
            timeout: config.timeout(),
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        })
    }

    /// Sends a request and waits for the response.
    ///
    /// An error envelope comes back as [`ClientError::Remote`].
    pub async fn send_request<T: serde::Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Message, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, msg_type, payload)?;
        let rx = self.router.expect_reply(&id)?;

        if let Err(e) = self.send_text(&msg).await {
            self.router.forget(&id);
            return Err(e);
        }

        let result = tokio::time::timeout(self.timeout, rx).await;
        // Clean up on any exit path.
        self.router.forget(&id);

        match result {
            Ok(Ok(resp)) => match resp.error {
                Some(err) => Err(err.into()),
                None => Ok(resp),
            },
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Opens an upload stream. The reply slot is registered before
    /// `upload_open` is sent, so an immediate rejection is not lost.
    pub async fn open_upload(
        &self,
        protocol_version: ProtocolVersion,
        headers: HashMap<String, String>,
    ) -> Result<UploadStream, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let open = UploadOpenRequest {
            protocol_version,
            headers,
        };
        let msg = Message::new(&id, MessageType::UploadOpen, Some(&open))?;
        let reply = self.router.expect_reply(&id)?;
        let stream = UploadStream::new(
            id,
            self.write_tx.clone(),
            Arc::clone(&self.router),
            reply,
        );
        self.send_text(&msg).await?;
        Ok(stream)
    }

    /// Requests a download and returns the stream its chunks arrive on.
    ///
    /// `chunk_size` 0 lets the server pick.
    pub async fn open_download(
        &self,
        file_id: &str,
        chunk_size: u32,
    ) -> Result<ChannelSource, ClientError> {
        let id = uuid::Uuid::new_v4().to_string();
        let req = DownloadRequest {
            id: file_id.to_string(),
            chunk_size,
        };
        let msg = Message::new(&id, MessageType::Download, Some(&req))?;
        let source = self.router.open_stream(&id, DOWNLOAD_QUEUE_DEPTH)?;
        if let Err(e) = self.send_text(&msg).await {
            self.router.close_stream(&id);
            return Err(e);
        }
        Ok(source)
    }

    /// Fetches the server's transfer constraints.
    pub async fn constraints(&self) -> Result<ConstraintsResponse, ClientError> {
        let resp = self
            .send_request::<()>(MessageType::Constraints, None)
            .await?;
        Ok(resp.expect_payload()?)
    }

    /// Whether the connection is gone.
    pub fn is_closed(&self) -> bool {
        self.router.is_closed()
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
        self.router.close();
    }

    async fn send_text(&self, msg: &Message) -> Result<(), ClientError> {
        let json = serde_json::to_string(msg)?;
        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| ClientError::Closed)
    }
}

impl ConstraintsSource for WsClient {
    fn fetch_constraints(&self) -> TransferFuture<'_, Result<Constraints, TransferError>> {
        Box::pin(async move {
            let resp = self
                .constraints()
                .await
                .map_err(|e| TransferError::Negotiation(e.to_string()))?;
            Ok(resp.into())
        })
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.router.close();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}
