//! Wire protocol for the chunked file service.
//!
//! Control traffic is JSON text frames wrapped in a [`Message`] envelope;
//! chunk data travels in binary frames (see [`binary`]).

pub mod binary;
pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use binary::{ChunkFrame, ChunkHeader, FrameError, encode_chunk_frame, parse_chunk_frame};
pub use constants::MessageType;
pub use envelope::{EnvelopeError, ErrorBody, Message};
pub use types::ProtocolVersion;
