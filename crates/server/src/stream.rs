//! Outbound download stream over a client connection.

use filesvc_protocol::constants::MessageType;
use filesvc_protocol::envelope::Message;
use filesvc_protocol::messages::DownloadEndResponse;
use filesvc_protocol::{ChunkHeader, encode_chunk_frame};
use filesvc_transfer::{ChunkMessage, ChunkSink, TransferError, TransferFuture};

use crate::connection::Sender;

/// [`ChunkSink`] writing `download_chunk` frames under one request id and
/// terminating with a `download_end` message.
pub struct DownloadSink {
    sender: Sender,
    id: String,
    size: u32,
    chunks: u32,
}

impl DownloadSink {
    pub fn new(sender: Sender, id: impl Into<String>) -> Self {
        Self {
            sender,
            id: id.into(),
            size: 0,
            chunks: 0,
        }
    }
}

impl ChunkSink for DownloadSink {
    fn send(&mut self, chunk: ChunkMessage) -> TransferFuture<'_, Result<(), TransferError>> {
        Box::pin(async move {
            let header = ChunkHeader {
                id: self.id.clone(),
                msg_type: MessageType::DownloadChunk,
                filename: None,
            };
            let frame = encode_chunk_frame(&header, &chunk.payload)
                .map_err(|e| TransferError::StreamWrite(e.to_string()))?;
            self.sender
                .send_frame(frame)
                .await
                .map_err(|e| TransferError::StreamWrite(e.to_string()))?;

            // Payloads are bounded by the negotiated chunk size.
            self.size += chunk.payload.len() as u32;
            self.chunks += 1;
            Ok(())
        })
    }

    fn finish(&mut self) -> TransferFuture<'_, Result<(), TransferError>> {
        Box::pin(async move {
            let end = DownloadEndResponse {
                size: self.size,
                chunks: self.chunks,
            };
            let msg = Message::new(&self.id, MessageType::DownloadEnd, Some(&end))
                .map_err(|e| TransferError::StreamWrite(e.to_string()))?;
            self.sender
                .send_msg(msg)
                .await
                .map_err(|e| TransferError::StreamWrite(e.to_string()))
        })
    }
}
