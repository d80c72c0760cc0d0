//! Outbound upload stream.

use std::sync::Arc;

use filesvc_protocol::constants::{MessageType, WS_ERR_CODE_INTERNAL};
use filesvc_protocol::envelope::Message;
use filesvc_protocol::messages::UploadResultResponse;
use filesvc_protocol::{ChunkHeader, encode_chunk_frame};
use filesvc_transfer::{ChunkMessage, ChunkSink, TransferError, TransferFuture};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tracing::debug;

use crate::error::ClientError;
use crate::router::Router;

/// One open upload: a [`ChunkSink`] writing `upload_chunk` frames under the
/// stream id, plus the slot the server's final reply lands in.
///
/// The server may answer with an error before the stream is finished; the
/// next [`send`](ChunkSink::send) then fails with that error so the writer
/// stops early.
///
/// Dropping the stream before `upload_close` went out sends an `error`
/// under the stream id, which makes the server fail and release its side.
pub struct UploadStream {
    id: String,
    write_tx: mpsc::Sender<tungstenite::Message>,
    router: Arc<Router>,
    reply: oneshot::Receiver<Message>,
    early: Option<Message>,
    closed: bool,
}

impl UploadStream {
    pub(crate) fn new(
        id: String,
        write_tx: mpsc::Sender<tungstenite::Message>,
        router: Arc<Router>,
        reply: oneshot::Receiver<Message>,
    ) -> Self {
        Self {
            id,
            write_tx,
            router,
            reply,
            early: None,
            closed: false,
        }
    }

    /// Stream id (the id of the `upload_open` message).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the server's `upload_result`.
    ///
    /// No timeout: the server replies only after reassembly and storage.
    pub async fn result(mut self) -> Result<UploadResultResponse, ClientError> {
        let msg = match self.early.take() {
            Some(msg) => msg,
            None => (&mut self.reply).await.map_err(|_| ClientError::Closed)?,
        };
        if let Some(err) = msg.error {
            return Err(err.into());
        }
        Ok(msg.expect_payload()?)
    }

    /// Fails if the server already replied or the connection is gone.
    fn check_reply(&mut self) -> Result<(), TransferError> {
        if let Some(msg) = &self.early {
            return Err(early_error(msg));
        }
        match self.reply.try_recv() {
            Ok(msg) => {
                let err = early_error(&msg);
                self.early = Some(msg);
                Err(err)
            }
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(TransferError::StreamWrite("connection closed".into()))
            }
        }
    }

    async fn write(&self, msg: tungstenite::Message) -> Result<(), TransferError> {
        self.write_tx
            .send(msg)
            .await
            .map_err(|_| TransferError::StreamWrite("connection closed".into()))
    }
}

fn early_error(msg: &Message) -> TransferError {
    match &msg.error {
        Some(err) => TransferError::Remote {
            code: err.code,
            message: err.message.clone(),
        },
        None => TransferError::StreamWrite(format!(
            "server replied {:?} before the stream ended",
            msg.msg_type
        )),
    }
}

impl ChunkSink for UploadStream {
    fn send(&mut self, chunk: ChunkMessage) -> TransferFuture<'_, Result<(), TransferError>> {
        Box::pin(async move {
            self.check_reply()?;
            let header = ChunkHeader {
                id: self.id.clone(),
                msg_type: MessageType::UploadChunk,
                filename: chunk.filename,
            };
            let frame = encode_chunk_frame(&header, &chunk.payload)
                .map_err(|e| TransferError::StreamWrite(e.to_string()))?;
            self.write(tungstenite::Message::Binary(frame.into())).await
        })
    }

    fn finish(&mut self) -> TransferFuture<'_, Result<(), TransferError>> {
        Box::pin(async move {
            self.check_reply()?;
            let close = Message::new::<()>(&self.id, MessageType::UploadClose, None)
                .map_err(|e| TransferError::StreamWrite(e.to_string()))?;
            let json =
                serde_json::to_string(&close).map_err(|e| TransferError::StreamWrite(e.to_string()))?;
            self.write(tungstenite::Message::Text(json.into())).await?;
            self.closed = true;
            Ok(())
        })
    }
}

impl Drop for UploadStream {
    fn drop(&mut self) {
        self.router.forget(&self.id);
        if self.closed || self.write_tx.is_closed() {
            return;
        }

        let abort = Message::error(&self.id, WS_ERR_CODE_INTERNAL, "upload abandoned by client");
        let Ok(json) = serde_json::to_string(&abort) else {
            return;
        };
        let frame = tungstenite::Message::Text(json.into());
        match self.write_tx.try_send(frame) {
            Ok(()) => debug!(stream = %self.id, "upload abandoned"),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                // Queue is busy; finish the send off the drop path.
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let tx = self.write_tx.clone();
                    handle.spawn(async move {
                        let _ = tx.send(frame).await;
                    });
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
