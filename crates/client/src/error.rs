//! Client error type.

use filesvc_protocol::envelope::{EnvelopeError, ErrorBody};
use filesvc_transfer::TransferError;
use tokio_tungstenite::tungstenite;

/// Errors from the file service client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server address: {0}")]
    InvalidAddr(String),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("server error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error(transparent)]
    Transfer(TransferError),
}

impl ClientError {
    /// Wire error code, for failures that carry one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            Self::Transfer(e) => Some(e.code()),
            _ => None,
        }
    }
}

impl From<ErrorBody> for ClientError {
    fn from(body: ErrorBody) -> Self {
        Self::Remote {
            code: body.code,
            message: body.message,
        }
    }
}

impl From<TransferError> for ClientError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Remote { code, message } => Self::Remote { code, message },
            other => Self::Transfer(other),
        }
    }
}

/// Lets client failures surface inside transfer phases.
impl From<ClientError> for TransferError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Transfer(inner) => inner,
            ClientError::Remote { code, message } => TransferError::Remote { code, message },
            ClientError::Closed => TransferError::StreamWrite("connection closed".into()),
            other => TransferError::StreamWrite(other.to_string()),
        }
    }
}
