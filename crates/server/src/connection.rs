//! Client connection management: read/write pumps, ping/pong, upload
//! stream routing.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use filesvc_protocol::constants::{
    MessageType, WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_CONFLICT, WS_ERR_CODE_NOT_FOUND,
    WS_ERR_CODE_NOT_IMPLEMENTED, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};
use filesvc_protocol::envelope::Message;
use filesvc_protocol::parse_chunk_frame;
use filesvc_transfer::{ChannelSource, ChunkMessage, StreamEvent, TransferError};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::handler::Handler;
use crate::{SEND_BUFFER_SIZE, UPLOAD_BUFFER_SIZE};

/// Handle for sending messages to one connected client.
///
/// Cloneable; wraps an `mpsc::Sender`. Sends wait for queue space, so a
/// slow client slows down whoever is producing for it.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    pub(crate) fn new(tx: mpsc::Sender<WsMessage>) -> Self {
        Self { tx }
    }

    /// Sends a protocol [`Message`] as JSON text.
    ///
    /// Returns `Err` only if the connection is gone.
    pub async fn send_msg(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|_| SendError)
    }

    /// Sends an error response for the given request message.
    pub async fn send_error(
        &self,
        req: &Message,
        code: i32,
        message: &str,
    ) -> Result<(), SendError> {
        self.send_msg(req.reply_error(code, message)).await
    }

    /// Sends an encoded binary chunk frame.
    pub async fn send_frame(&self, frame: Vec<u8>) -> Result<(), SendError> {
        self.tx
            .send(WsMessage::Binary(frame.into()))
            .await
            .map_err(|_| SendError)
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Error returned when the connection is closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: connection closed")]
pub struct SendError;

/// Active connection to one client.
///
/// Owns the read/write pump tasks and provides a [`Sender`] for
/// asynchronous message delivery.
pub struct ClientConnection {
    peer: SocketAddr,
    sender: Sender,
    cancel: CancellationToken,
}

impl ClientConnection {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns a cloneable [`Sender`] for this connection.
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Signals the pumps to stop. In-flight streams on this connection fail.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs the read and write pumps for a WebSocket connection.
///
/// The pumps run as background tokio tasks and stop when the connection is
/// closed or the cancel token is triggered.
pub(crate) fn spawn_connection<S, H>(
    ws_stream: S,
    peer: SocketAddr,
    handler: Arc<H>,
    server_cancel: &CancellationToken,
) -> ClientConnection
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let sender = Sender::new(tx);
    let span = tracing::info_span!("connection", %peer);

    let conn = ClientConnection {
        peer,
        sender: sender.clone(),
        cancel: cancel.clone(),
    };

    let (ws_sink, ws_stream) = ws_stream.split();

    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()).instrument(span.clone()));

    let read_cancel = cancel;
    tokio::spawn(
        async move {
            read_pump(ws_stream, sender, Arc::clone(&handler), read_cancel.clone()).await;
            // When the read pump exits, stop the write pump too.
            read_cancel.cancel();
            handler.on_disconnected().await;
            tracing::info!("client disconnected");
        }
        .instrument(span),
    );

    conn
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames, routes upload chunks and dispatches requests
/// to the handler.
async fn read_pump<S, H>(mut stream: S, sender: Sender, handler: Arc<H>, cancel: CancellationToken)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    // Chunk frames keep a busy upload alive as well as pongs do.
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);
    // Dropped on exit, which fails every upload still open on this socket.
    let mut uploads = UploadRoutes::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                tracing::warn!("no traffic within {WS_PONG_WAIT:?}, closing connection");
                break;
            }

            frame = stream.next() => {
                let ws_msg = match frame {
                    Some(Ok(ws_msg)) => ws_msg,
                    Some(Err(e)) => {
                        tracing::error!("read pump error: {e}");
                        break;
                    }
                    None => break,
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                match ws_msg {
                    WsMessage::Text(text) => {
                        dispatch_text(&handler, &sender, &mut uploads, &text).await;
                    }
                    WsMessage::Binary(data) => {
                        if data.len() > WS_MAX_MESSAGE_SIZE {
                            tracing::error!("binary message exceeds max size ({} > {})", data.len(), WS_MAX_MESSAGE_SIZE);
                            continue;
                        }
                        route_binary(&mut uploads, &data).await;
                    }
                    WsMessage::Pong(_) => {}
                    WsMessage::Ping(data) => {
                        let _ = sender.tx.try_send(WsMessage::Pong(data));
                    }
                    WsMessage::Close(_) => {
                        tracing::info!("received close frame");
                        break;
                    }
                    WsMessage::Frame(_) => {}
                }
            }
        }
    }

    if !uploads.is_empty() {
        tracing::warn!(open = uploads.len(), "connection lost with uploads in flight");
    }
}

/// Dispatches a text (JSON) message to the appropriate handler method.
async fn dispatch_text<H: Handler>(
    handler: &Arc<H>,
    sender: &Sender,
    uploads: &mut UploadRoutes,
    text: &str,
) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("invalid message JSON: {e}");
            return;
        }
    };

    let s = sender.clone();
    match msg.msg_type {
        MessageType::Ping => handler.on_ping(s, msg).await,
        MessageType::Constraints => handler.on_constraints(s, msg).await,
        MessageType::FileInfo => handler.on_file_info(s, msg).await,
        MessageType::ListFiles => handler.on_list_files(s, msg).await,
        MessageType::DeleteFile => handler.on_delete_file(s, msg).await,
        MessageType::UploadOpen => {
            if msg.id.is_empty() {
                let _ = s
                    .send_error(&msg, WS_ERR_CODE_BAD_REQUEST, "upload stream id is required")
                    .await;
                return;
            }
            let Some(source) = uploads.open(&msg.id) else {
                tracing::warn!(stream = %msg.id, "duplicate upload stream id");
                let _ = s
                    .send_error(&msg, WS_ERR_CODE_CONFLICT, "upload stream already open")
                    .await;
                return;
            };
            let handler = Arc::clone(handler);
            tokio::spawn(
                async move { handler.on_upload(s, msg, source).await }.in_current_span(),
            );
        }
        MessageType::UploadClose => {
            if !uploads.close(&msg.id).await {
                let _ = s
                    .send_error(&msg, WS_ERR_CODE_NOT_FOUND, "unknown upload stream")
                    .await;
            }
        }
        MessageType::Error => {
            // A client abandoning an upload; never answered.
            let reason = msg.error.map(|e| e.message).unwrap_or_default();
            if !uploads.abort(&msg.id, &reason).await {
                tracing::debug!(stream = %msg.id, "error for unknown upload stream ignored");
            }
        }
        MessageType::Download => {
            let handler = Arc::clone(handler);
            tokio::spawn(async move { handler.on_download(s, msg).await }.in_current_span());
        }
        _ => {
            tracing::warn!(msg_type = ?msg.msg_type, "unhandled message type");
            let _ = sender
                .send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "unknown message type")
                .await;
        }
    }
}

/// Routes a binary chunk frame to its upload stream.
async fn route_binary(uploads: &mut UploadRoutes, data: &[u8]) {
    let frame = match parse_chunk_frame(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("failed to parse chunk frame: {e}");
            return;
        }
    };
    if frame.header.msg_type != MessageType::UploadChunk {
        tracing::warn!(msg_type = ?frame.header.msg_type, "unexpected binary frame type");
        return;
    }
    let chunk = ChunkMessage {
        filename: frame.header.filename,
        payload: frame.data,
    };
    uploads.route(&frame.header.id, chunk).await;
}

/// Open upload streams on one connection, keyed by stream id.
///
/// Only the read pump touches this, so it needs no lock.
#[derive(Default)]
struct UploadRoutes {
    streams: HashMap<String, mpsc::Sender<StreamEvent>>,
}

impl UploadRoutes {
    /// Registers a stream. `None` if the id is already open.
    fn open(&mut self, id: &str) -> Option<ChannelSource> {
        if self.streams.contains_key(id) {
            return None;
        }
        let (tx, rx) = mpsc::channel(UPLOAD_BUFFER_SIZE);
        self.streams.insert(id.to_string(), tx);
        Some(ChannelSource::new(rx))
    }

    /// Forwards a chunk, waiting while the stream's queue is full.
    ///
    /// Chunks for a stream whose reader already gave up are dropped.
    async fn route(&mut self, id: &str, chunk: ChunkMessage) {
        let Some(tx) = self.streams.get(id) else {
            tracing::debug!(stream = id, "chunk for unknown upload stream dropped");
            return;
        };
        if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
            tracing::debug!(stream = id, "upload reader gone, dropping stream");
            self.streams.remove(id);
        }
    }

    /// Ends a stream cleanly. Returns `false` if it was not open.
    async fn close(&mut self, id: &str) -> bool {
        let Some(tx) = self.streams.remove(id) else {
            return false;
        };
        // The reader may already have failed; that is reported by its handler.
        let _ = tx.send(StreamEvent::End).await;
        true
    }

    /// Fails a stream the client gave up on, so its reader releases what it
    /// has accumulated. Returns `false` if it was not open.
    async fn abort(&mut self, id: &str, reason: &str) -> bool {
        let Some(tx) = self.streams.remove(id) else {
            return false;
        };
        tracing::debug!(stream = id, reason, "upload aborted by client");
        let err = TransferError::StreamRead(format!("upload aborted by client: {reason}"));
        let _ = tx.send(StreamEvent::Failed(err)).await;
        true
    }

    fn len(&self) -> usize {
        self.streams.len()
    }

    fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
