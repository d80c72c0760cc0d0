//! Chunk frames: 4-byte big-endian header length + JSON header + raw payload.
//!
//! Chunk data never goes through the JSON envelope; only the small header
//! is JSON, so payload bytes cross the wire unencoded.

use serde::{Deserialize, Serialize};

use crate::constants::{CHUNK_FRAME_OVERHEAD, MessageType, WS_MAX_MESSAGE_SIZE};

/// Header of a binary chunk frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// Stream id (the id of the `upload_open` or `download` request).
    pub id: String,
    /// `upload_chunk` or `download_chunk`.
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    /// Upload filename, inline convention only, first frame only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A decoded chunk frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub header: ChunkHeader,
    pub data: Vec<u8>,
}

/// Encodes a chunk frame for sending as a WebSocket binary message.
pub fn encode_chunk_frame(header: &ChunkHeader, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let header_json =
        serde_json::to_vec(header).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    if header_json.len() > CHUNK_FRAME_OVERHEAD - 4 {
        return Err(FrameError::HeaderTooLarge(header_json.len()));
    }

    let total = 4 + header_json.len() + payload.len();
    if total > WS_MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge {
            size: total,
            max: WS_MAX_MESSAGE_SIZE,
        });
    }

    let header_len = header_json.len() as u32;
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&header_len.to_be_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Parses a raw binary WebSocket message into a [`ChunkFrame`].
pub fn parse_chunk_frame(data: &[u8]) -> Result<ChunkFrame, FrameError> {
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(FrameError::TooShort);
    };
    let header_len = u32::from_be_bytes(*len_bytes) as usize;

    if rest.len() < header_len {
        return Err(FrameError::HeaderTruncated {
            expected: header_len,
            got: rest.len(),
        });
    }

    let (header_bytes, payload) = rest.split_at(header_len);
    let header: ChunkHeader = serde_json::from_slice(header_bytes)
        .map_err(|e| FrameError::InvalidJson(e.to_string()))?;

    Ok(ChunkFrame {
        header,
        data: payload.to_vec(),
    })
}

/// Errors from chunk frame encoding and parsing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short (need at least 4 bytes)")]
    TooShort,

    #[error("header truncated: expected {expected} bytes, got {got}")]
    HeaderTruncated { expected: usize, got: usize },

    #[error("invalid header JSON: {0}")]
    InvalidJson(String),

    #[error("header too large: {0} bytes")]
    HeaderTooLarge(usize),

    #[error("frame too large: {size} bytes exceeds {max}")]
    TooLarge { size: usize, max: usize },
}
