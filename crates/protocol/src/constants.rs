use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time to wait for any incoming frame before the peer is considered gone.
///
/// Both the server and the client read pumps restart this deadline on every
/// inbound frame, not just pongs, since a large transfer keeps the socket
/// busy with chunk frames.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often the writer side pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Maximum WebSocket message size in bytes (16 MiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Bytes reserved in every chunk frame for the length prefix and JSON header.
pub const CHUNK_FRAME_OVERHEAD: usize = 64 * 1024;

/// Largest chunk payload that still fits in a single frame.
pub const MAX_CHUNK_PAYLOAD: usize = WS_MAX_MESSAGE_SIZE - CHUNK_FRAME_OVERHEAD;

/// Default batch size advertised by servers (1 MiB).
pub const DEFAULT_BATCH_SIZE: u32 = 1024 * 1024;

/// Default file size ceiling advertised by servers (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u32 = 100 * 1024 * 1024;

/// Timeout for unary request/response operations.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Stream header carrying the upload filename under the header convention.
pub const FILENAME_HEADER: &str = "filename";

/// Longest accepted filename in bytes.
pub const MAX_FILENAME_LEN: usize = 1024;

/// WebSocket message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Keepalive
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,

    // Negotiation
    #[serde(rename = "constraints")]
    Constraints,
    #[serde(rename = "constraints_response")]
    ConstraintsResponse,

    // Upload stream
    #[serde(rename = "upload_open")]
    UploadOpen,
    #[serde(rename = "upload_chunk")]
    UploadChunk,
    #[serde(rename = "upload_close")]
    UploadClose,
    #[serde(rename = "upload_result")]
    UploadResult,

    // Download stream
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "download_chunk")]
    DownloadChunk,
    #[serde(rename = "download_end")]
    DownloadEnd,

    // Pass-through file operations
    #[serde(rename = "file_info")]
    FileInfo,
    #[serde(rename = "file_info_response")]
    FileInfoResponse,
    #[serde(rename = "list_files")]
    ListFiles,
    #[serde(rename = "list_files_response")]
    ListFilesResponse,
    #[serde(rename = "delete_file")]
    DeleteFile,
    #[serde(rename = "operation_result")]
    OperationResult,

    #[serde(rename = "error")]
    Error,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Common WebSocket error codes.
pub const WS_ERR_CODE_BAD_REQUEST: i32 = 400;
pub const WS_ERR_CODE_NOT_FOUND: i32 = 404;
pub const WS_ERR_CODE_CONFLICT: i32 = 409;
pub const WS_ERR_CODE_TOO_LARGE: i32 = 413;
pub const WS_ERR_CODE_INTERNAL: i32 = 500;
pub const WS_ERR_CODE_NOT_IMPLEMENTED: i32 = 501;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageType::UploadOpen).unwrap(),
            "\"upload_open\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::DownloadEnd).unwrap(),
            "\"download_end\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::ConstraintsResponse).unwrap(),
            "\"constraints_response\""
        );
    }

    #[test]
    fn message_type_deserialization() {
        let mt: MessageType = serde_json::from_str("\"upload_chunk\"").unwrap();
        assert_eq!(mt, MessageType::UploadChunk);
    }

    #[test]
    fn unknown_message_type() {
        let mt: MessageType = serde_json::from_str("\"resume_upload\"").unwrap();
        assert_eq!(mt, MessageType::Unknown);
    }

    #[test]
    fn chunk_payload_fits_in_frame() {
        assert!(MAX_CHUNK_PAYLOAD + CHUNK_FRAME_OVERHEAD <= WS_MAX_MESSAGE_SIZE);
        assert!((DEFAULT_BATCH_SIZE as usize) <= MAX_CHUNK_PAYLOAD);
    }
}
