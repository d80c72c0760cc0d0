//! Chunked streaming transfer core.
//!
//! Splits byte sources into size-bounded chunks on the sending side,
//! reassembles them on the receiving side, and negotiates the chunk size
//! and file-size ceiling between peers before a transfer starts.
//!
//! Transports plug in through [`ChunkSink`] / [`ChunkSource`]; storage plugs
//! in through [`FileStore`] / [`Settings`].

mod channel;
mod chunked;
mod constraints;
mod metadata;
mod session;
mod store;
mod types;

use std::future::Future;
use std::pin::Pin;

use filesvc_protocol::constants::{
    WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_INTERNAL, WS_ERR_CODE_NOT_FOUND, WS_ERR_CODE_TOO_LARGE,
};

pub use channel::{ChannelSink, ChannelSource, ChunkSink, ChunkSource, StreamEvent, stream_channel};
pub use chunked::{ChunkReader, ChunkWriter, Reassembled};
pub use constraints::{Constraints, ConstraintsSource, NegotiationPolicy, Negotiator};
pub use metadata::{FilenameConvention, FilenameResolver, MetadataCarrier, validate_filename};
pub use session::{TransferSession, TransferState, receive_upload, send_download};
pub use store::{FileIdentity, FileInfo, FileInfoList, FileStore, MemoryStore, Settings, StoreError};
pub use types::{ChunkMessage, Direction, WriteSummary};

/// Boxed future returned across the transport and storage seams.
pub type TransferFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors produced by the transfer core.
///
/// None of these are retried internally; a caller that wants to retry must
/// restart the transfer from the beginning.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("file too large: exceeds {limit} bytes")]
    FileTooLarge { limit: u32 },

    #[error("stream read failed: {0}")]
    StreamRead(String),

    #[error("stream write failed: {0}")]
    StreamWrite(String),

    #[error("missing metadata: {0}")]
    MissingMetadata(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] StoreError),

    #[error("source read failed: {0}")]
    Source(#[from] std::io::Error),

    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("invalid transfer state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: TransferState,
        to: TransferState,
    },
}

impl TransferError {
    /// Wire error code reported to the peer for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::MissingMetadata(_) => WS_ERR_CODE_BAD_REQUEST,
            Self::FileTooLarge { .. } => WS_ERR_CODE_TOO_LARGE,
            Self::Backend(StoreError::NotFound(_)) => WS_ERR_CODE_NOT_FOUND,
            Self::Remote { code, .. } => *code,
            Self::Negotiation(_)
            | Self::StreamRead(_)
            | Self::StreamWrite(_)
            | Self::Backend(_)
            | Self::Source(_)
            | Self::InvalidTransition { .. } => WS_ERR_CODE_INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(TransferError::Validation("x".into()).code(), 400);
        assert_eq!(TransferError::MissingMetadata("x".into()).code(), 400);
        assert_eq!(TransferError::FileTooLarge { limit: 1 }.code(), 413);
        assert_eq!(
            TransferError::Backend(StoreError::NotFound("f".into())).code(),
            404
        );
        assert_eq!(
            TransferError::Backend(StoreError::Other("disk".into())).code(),
            500
        );
        assert_eq!(TransferError::StreamRead("x".into()).code(), 500);
        assert_eq!(
            TransferError::Remote {
                code: 409,
                message: "dup".into()
            }
            .code(),
            409
        );
    }

    #[test]
    fn backend_error_keeps_cause() {
        let err = TransferError::from(StoreError::Other("disk full".into()));
        assert_eq!(err.to_string(), "storage backend error: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }
}
