//! Per-transfer orchestration and state tracking.

use std::future::Future;
use std::time::Instant;

use tracing::{Instrument, Span, debug, info, warn};

use crate::TransferError;
use crate::channel::{ChunkSink, ChunkSource};
use crate::chunked::{ChunkReader, ChunkWriter};
use crate::constraints::Constraints;
use crate::metadata::FilenameResolver;
use crate::store::{FileIdentity, FileStore};
use crate::types::{Direction, WriteSummary};

/// Lifecycle of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Negotiating,
    Streaming,
    Finalizing,
    Completed,
    Failed,
}

impl TransferState {
    /// Returns `true` if `next` is a legal successor.
    pub fn can_advance_to(self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Idle, Negotiating)
                | (Negotiating, Streaming)
                | (Streaming, Finalizing)
                | (Finalizing, Completed)
                | (Idle | Negotiating | Streaming | Finalizing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }
}

/// State and log context of a single upload or download.
///
/// Owned by the one task running the transfer. Each phase runs inside the
/// session's span; a phase error moves the session straight to
/// [`TransferState::Failed`].
#[derive(Debug)]
pub struct TransferSession {
    id: String,
    direction: Direction,
    state: TransferState,
    span: Span,
    started_at: Instant,
}

impl TransferSession {
    /// Creates an idle session logging under `parent`.
    pub fn new(direction: Direction, parent: &Span) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            parent: parent,
            "transfer",
            transfer_id = %id,
            direction = %direction,
        );
        Self {
            id,
            direction,
            state: TransferState::Idle,
            span,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Runs the negotiation phase.
    pub async fn negotiate<F, T>(&mut self, phase: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, TransferError>>,
    {
        self.run(TransferState::Negotiating, phase).await
    }

    /// Runs the streaming phase.
    pub async fn stream<F, T>(&mut self, phase: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, TransferError>>,
    {
        self.run(TransferState::Streaming, phase).await
    }

    /// Runs the finalization phase and completes the session on success.
    pub async fn finalize<F, T>(&mut self, phase: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, TransferError>>,
    {
        let out = self.run(TransferState::Finalizing, phase).await?;
        self.advance(TransferState::Completed)?;
        self.span.in_scope(|| {
            info!(
                elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                "transfer completed"
            );
        });
        Ok(out)
    }

    /// Marks the session failed. Idempotent.
    pub fn fail(&mut self, err: &TransferError) {
        if self.state.is_terminal() {
            return;
        }
        let from = self.state;
        self.state = TransferState::Failed;
        self.span.in_scope(|| {
            warn!(phase = ?from, code = err.code(), "transfer failed: {err}");
        });
    }

    fn advance(&mut self, next: TransferState) -> Result<(), TransferError> {
        if !self.state.can_advance_to(next) {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.span.in_scope(|| debug!(from = ?self.state, to = ?next, "transfer state"));
        self.state = next;
        Ok(())
    }

    async fn run<F, T>(&mut self, state: TransferState, phase: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, TransferError>>,
    {
        self.advance(state)?;
        match phase.instrument(self.span.clone()).await {
            Ok(out) => Ok(out),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }
}

/// Server side of an upload: drains `source`, resolves the filename and
/// hands the reassembled bytes to `store`.
///
/// Nothing reaches the store unless the stream ended cleanly.
pub async fn receive_upload<S, Src>(
    store: &S,
    source: &mut Src,
    mut resolver: FilenameResolver,
    limits: Constraints,
    parent: &Span,
) -> Result<FileIdentity, TransferError>
where
    S: FileStore + ?Sized,
    Src: ChunkSource + ?Sized,
{
    let mut session = TransferSession::new(Direction::Upload, parent);

    session
        .negotiate(async {
            resolver.precheck()?;
            Ok(())
        })
        .await?;

    let (filename, received) = session
        .stream(async {
            let received = ChunkReader::new()
                .with_limit(limits.file_limit())
                .drain(source, Some(&mut resolver))
                .await?;
            let filename = resolver.extract()?;
            Ok((filename, received))
        })
        .await?;

    session
        .finalize(async move {
            let size = received.bytes_received;
            info!(
                %filename,
                size,
                chunks = received.chunks_received,
                "upload reassembled"
            );
            let id = store.upload(&filename, received.buffer).await?;
            Ok::<_, TransferError>(FileIdentity { id, size })
        })
        .await
}

/// Server side of a download: fetches the whole object, then streams it.
///
/// `requested_chunk_size` of 0 means the server's batch size; larger
/// requests are capped to it.
pub async fn send_download<S, K>(
    store: &S,
    id: &str,
    sink: &mut K,
    requested_chunk_size: u32,
    limits: Constraints,
    parent: &Span,
) -> Result<WriteSummary, TransferError>
where
    S: FileStore + ?Sized,
    K: ChunkSink + ?Sized,
{
    let mut session = TransferSession::new(Direction::Download, parent);

    let writer = session
        .negotiate(async {
            let chunk_size = match requested_chunk_size {
                0 => limits.max_chunk_size,
                n => n.min(limits.max_chunk_size),
            };
            ChunkWriter::new(chunk_size)
        })
        .await?;

    let summary = session
        .stream(async {
            // Eager: the full object is in memory before the first chunk.
            let data = store.download(id).await?;
            let mut bytes = data.as_slice();
            writer.stream(&mut bytes, sink, None).await
        })
        .await?;

    session
        .finalize(async move {
            info!(
                file_id = id,
                size = summary.bytes_sent,
                chunks = summary.chunks_sent,
                "download streamed"
            );
            Ok(summary)
        })
        .await
}
