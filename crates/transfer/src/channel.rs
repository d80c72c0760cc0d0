//! Transport seams for chunk streams, plus an in-process channel pair.

use tokio::sync::mpsc;

use crate::types::ChunkMessage;
use crate::{TransferError, TransferFuture};

/// Outbound, ordered chunk stream.
pub trait ChunkSink: Send {
    /// Sends one chunk. Resolves once the transport has accepted it.
    fn send(&mut self, chunk: ChunkMessage) -> TransferFuture<'_, Result<(), TransferError>>;

    /// Signals end-of-stream after the final chunk.
    fn finish(&mut self) -> TransferFuture<'_, Result<(), TransferError>>;
}

/// Inbound, ordered chunk stream.
pub trait ChunkSource: Send {
    /// Receives the next chunk.
    ///
    /// `Ok(None)` is the end-of-stream signal. Any `Err` is a channel failure
    /// and the stream must not be read again.
    fn recv(&mut self) -> TransferFuture<'_, Result<Option<ChunkMessage>, TransferError>>;
}

/// Item carried by an in-process chunk channel.
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(ChunkMessage),
    End,
    Failed(TransferError),
}

/// Sending half of an in-process chunk channel.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }
}

impl ChunkSink for ChannelSink {
    fn send(&mut self, chunk: ChunkMessage) -> TransferFuture<'_, Result<(), TransferError>> {
        Box::pin(async move {
            self.tx
                .send(StreamEvent::Chunk(chunk))
                .await
                .map_err(|_| TransferError::StreamWrite("receiver closed".into()))
        })
    }

    fn finish(&mut self) -> TransferFuture<'_, Result<(), TransferError>> {
        Box::pin(async move {
            self.tx
                .send(StreamEvent::End)
                .await
                .map_err(|_| TransferError::StreamWrite("receiver closed".into()))
        })
    }
}

/// Receiving half of an in-process chunk channel.
///
/// A channel whose senders all drop without [`StreamEvent::End`] is a
/// broken stream, never a clean end.
pub struct ChannelSource {
    rx: mpsc::Receiver<StreamEvent>,
    ended: bool,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<StreamEvent>) -> Self {
        Self { rx, ended: false }
    }
}

impl ChunkSource for ChannelSource {
    fn recv(&mut self) -> TransferFuture<'_, Result<Option<ChunkMessage>, TransferError>> {
        Box::pin(async move {
            if self.ended {
                return Ok(None);
            }
            match self.rx.recv().await {
                Some(StreamEvent::Chunk(chunk)) => Ok(Some(chunk)),
                Some(StreamEvent::End) => {
                    self.ended = true;
                    Ok(None)
                }
                Some(StreamEvent::Failed(e)) => Err(e),
                None => Err(TransferError::StreamRead(
                    "channel closed before end of stream".into(),
                )),
            }
        })
    }
}

/// Creates a bounded in-process chunk channel.
pub fn stream_channel(capacity: usize) -> (ChannelSink, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink::new(tx), ChannelSource::new(rx))
}
