use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::TransferError;
use crate::channel::{ChunkSink, ChunkSource};
use crate::constraints::Constraints;
use crate::metadata::FilenameResolver;
use crate::types::{ChunkMessage, WriteSummary};

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Streams a byte source as fixed-size chunks.
///
/// Holds at most one read window at a time, so arbitrarily large sources
/// stream in constant memory.
#[derive(Debug, Clone)]
pub struct ChunkWriter {
    chunk_size: usize,
    limit: Option<u32>,
}

impl ChunkWriter {
    /// Creates a writer emitting chunks of at most `chunk_size` bytes.
    pub fn new(chunk_size: u32) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::Validation(
                "chunk size must be positive".into(),
            ));
        }
        Ok(Self {
            chunk_size: chunk_size as usize,
            limit: None,
        })
    }

    /// Creates a writer sized and capped by negotiated constraints.
    pub fn for_constraints(constraints: &Constraints) -> Result<Self, TransferError> {
        Ok(Self::new(constraints.max_chunk_size)?.with_limit(constraints.file_limit()))
    }

    /// Caps the total number of bytes the writer will send.
    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Reads `source` to its end, sending one chunk per filled window, then
    /// finishes the sink.
    ///
    /// `inline_filename` rides on the first message. A source with no bytes
    /// still delivers it, as a metadata-only message that is not counted as
    /// a chunk. A read error aborts without finishing the sink.
    pub async fn stream<R, K>(
        &self,
        source: &mut R,
        sink: &mut K,
        mut inline_filename: Option<String>,
    ) -> Result<WriteSummary, TransferError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
        K: ChunkSink + ?Sized,
    {
        let mut window = vec![0u8; self.chunk_size];
        let mut summary = WriteSummary::default();

        loop {
            let n = fill_window(source, &mut window).await?;
            if n == 0 {
                break;
            }

            // n <= chunk_size, which came from a u32.
            let total = summary
                .bytes_sent
                .checked_add(n as u32)
                .ok_or(TransferError::FileTooLarge { limit: u32::MAX })?;
            if let Some(limit) = self.limit {
                if total > limit {
                    return Err(TransferError::FileTooLarge { limit });
                }
            }

            let chunk = ChunkMessage {
                filename: inline_filename.take(),
                payload: window[..n].to_vec(),
            };
            sink.send(chunk).await?;

            summary.bytes_sent = total;
            summary.chunks_sent += 1;
            trace!(size = n, total, chunk = summary.chunks_sent, "sent chunk");
        }

        if let Some(filename) = inline_filename {
            sink.send(ChunkMessage {
                filename: Some(filename),
                payload: Vec::new(),
            })
            .await?;
        }

        sink.finish().await?;
        Ok(summary)
    }
}

/// Reads until `window` is full or the source ends. Returns bytes read.
async fn fill_window<R>(source: &mut R, window: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < window.len() {
        let n = source.read(&mut window[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Output of a drained stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reassembled {
    pub buffer: Vec<u8>,
    pub bytes_received: u32,
    pub chunks_received: u32,
}

/// Per-transfer reassembly state. Dropped on any failure.
#[derive(Default)]
struct Accumulator {
    buffer: Vec<u8>,
    total_bytes: u32,
    chunk_count: u32,
}

impl Accumulator {
    fn append(&mut self, payload: Vec<u8>, limit: Option<u32>) -> Result<(), TransferError> {
        let total = u32::try_from(payload.len())
            .ok()
            .and_then(|n| self.total_bytes.checked_add(n))
            .ok_or(TransferError::FileTooLarge { limit: u32::MAX })?;
        if let Some(limit) = limit {
            if total > limit {
                return Err(TransferError::FileTooLarge { limit });
            }
        }

        if self.buffer.is_empty() {
            self.buffer = payload;
        } else {
            self.buffer.extend_from_slice(&payload);
        }
        self.total_bytes = total;
        self.chunk_count += 1;
        Ok(())
    }

    fn finish(self) -> Reassembled {
        Reassembled {
            buffer: self.buffer,
            bytes_received: self.total_bytes,
            chunks_received: self.chunk_count,
        }
    }
}

/// Drains an inbound chunk stream into a contiguous buffer.
///
/// Appends in arrival order; the transport guarantees ordering, so there is
/// no reordering or gap detection here.
#[derive(Debug, Clone, Default)]
pub struct ChunkReader {
    limit: Option<u32>,
}

impl ChunkReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the drain once the total would exceed `limit` bytes.
    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Receives until end-of-stream.
    ///
    /// Every chunk is shown to `resolver` (upload direction). Any receive
    /// error discards what was accumulated.
    pub async fn drain<S>(
        &self,
        source: &mut S,
        mut resolver: Option<&mut FilenameResolver>,
    ) -> Result<Reassembled, TransferError>
    where
        S: ChunkSource + ?Sized,
    {
        let mut acc = Accumulator::default();

        while let Some(chunk) = source.recv().await? {
            if let Some(resolver) = resolver.as_deref_mut() {
                resolver.observe(&chunk);
            }
            if chunk.is_metadata_only() {
                continue;
            }

            let size = chunk.payload.len();
            acc.append(chunk.payload, self.limit)?;
            trace!(size, total = acc.total_bytes, "received chunk");
        }

        Ok(acc.finish())
    }
}
