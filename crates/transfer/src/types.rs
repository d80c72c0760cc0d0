use std::fmt;

/// One chunk of a transfer as handed to or taken from a transport.
///
/// Chunks carry no sequence number; the transport delivers them in order
/// and concatenation in arrival order rebuilds the source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkMessage {
    /// Inline filename (upload direction, inline convention, first message only).
    pub filename: Option<String>,
    /// Raw chunk bytes. Empty only for a metadata-only message.
    pub payload: Vec<u8>,
}

impl ChunkMessage {
    /// Creates a data chunk without metadata.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            filename: None,
            payload,
        }
    }

    /// Returns `true` if the message carries no chunk bytes.
    pub fn is_metadata_only(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Direction of a transfer as seen from the side running the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Download => "download",
        })
    }
}

/// Totals reported by the chunk writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    pub bytes_sent: u32,
    pub chunks_sent: u32,
}
