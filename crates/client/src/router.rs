//! Routes inbound messages to whoever is waiting on their id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use filesvc_protocol::ChunkFrame;
use filesvc_protocol::constants::MessageType;
use filesvc_protocol::envelope::Message;
use filesvc_protocol::messages::DownloadEndResponse;
use filesvc_transfer::{ChannelSource, ChunkMessage, StreamEvent, TransferError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::ClientError;

#[derive(Default)]
struct RouteTable {
    /// One-shot replies: unary requests and upload results.
    pending: HashMap<String, oneshot::Sender<Message>>,
    /// Open download streams.
    streams: HashMap<String, mpsc::Sender<StreamEvent>>,
    closed: bool,
}

/// Shared between the read pump and the request side of [`WsClient`].
///
/// The lock is never held across an await; stream senders are cloned out
/// first so a slow consumer cannot block registration.
///
/// [`WsClient`]: crate::WsClient
#[derive(Default)]
pub(crate) struct Router {
    table: Mutex<RouteTable>,
}

impl Router {
    fn lock(&self) -> MutexGuard<'_, RouteTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a one-shot reply slot for `id`.
    pub(crate) fn expect_reply(&self, id: &str) -> Result<oneshot::Receiver<Message>, ClientError> {
        let mut table = self.lock();
        if table.closed {
            return Err(ClientError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        table.pending.insert(id.to_string(), tx);
        Ok(rx)
    }

    /// Drops the reply slot for `id`, if still registered.
    pub(crate) fn forget(&self, id: &str) {
        self.lock().pending.remove(id);
    }

    /// Registers a download stream for `id`.
    pub(crate) fn open_stream(&self, id: &str, capacity: usize) -> Result<ChannelSource, ClientError> {
        let mut table = self.lock();
        if table.closed {
            return Err(ClientError::Closed);
        }
        let (tx, rx) = mpsc::channel(capacity);
        table.streams.insert(id.to_string(), tx);
        Ok(ChannelSource::new(rx))
    }

    pub(crate) fn close_stream(&self, id: &str) {
        self.lock().streams.remove(id);
    }

    /// Routes a JSON message: a pending reply first, then a download stream.
    pub(crate) async fn route_text(&self, msg: Message) {
        let (reply, stream) = {
            let mut table = self.lock();
            match table.pending.remove(&msg.id) {
                Some(tx) => (Some(tx), None),
                None => {
                    let terminal = matches!(msg.msg_type, MessageType::DownloadEnd)
                        || msg.is_error();
                    let stream = if terminal {
                        table.streams.remove(&msg.id)
                    } else {
                        table.streams.get(&msg.id).cloned()
                    };
                    (None, stream)
                }
            }
        };

        if let Some(tx) = reply {
            let _ = tx.send(msg);
            return;
        }
        let Some(stream) = stream else {
            warn!(msg_type = ?msg.msg_type, id = %msg.id, "no request waiting, dropping message");
            return;
        };

        let event = if let Some(err) = msg.error {
            StreamEvent::Failed(TransferError::Remote {
                code: err.code,
                message: err.message,
            })
        } else if msg.msg_type == MessageType::DownloadEnd {
            if let Ok(Some(end)) = msg.parse_payload::<DownloadEndResponse>() {
                debug!(id = %msg.id, size = end.size, chunks = end.chunks, "download end");
            }
            StreamEvent::End
        } else {
            warn!(msg_type = ?msg.msg_type, id = %msg.id, "unexpected message on download stream");
            return;
        };
        let _ = stream.send(event).await;
    }

    /// Routes a `download_chunk` frame, waiting while the stream is full.
    pub(crate) async fn route_frame(&self, frame: ChunkFrame) {
        if frame.header.msg_type != MessageType::DownloadChunk {
            warn!(msg_type = ?frame.header.msg_type, "unexpected binary frame type");
            return;
        }
        let id = frame.header.id;
        let Some(stream) = self.lock().streams.get(&id).cloned() else {
            trace!(%id, "chunk for unknown download dropped");
            return;
        };
        let chunk = ChunkMessage::new(frame.data);
        if stream.send(StreamEvent::Chunk(chunk)).await.is_err() {
            debug!(%id, "download reader gone, dropping stream");
            self.close_stream(&id);
        }
    }

    /// Fails everything still waiting. Later registrations get `Closed`.
    pub(crate) fn close(&self) {
        let mut table = self.lock();
        table.closed = true;
        // Dropped reply senders surface as `Closed`; dropped stream senders
        // as a stream read failure.
        table.pending.clear();
        table.streams.clear();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
