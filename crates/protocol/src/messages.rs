use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::ProtocolVersion;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens an upload stream. The message id becomes the stream id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOpenRequest {
    pub protocol_version: ProtocolVersion,
    /// Stream-level metadata (the `filename` header under v2).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Requests a file as a chunk stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub id: String,
    /// Chunk size the client negotiated; 0 lets the server pick.
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub chunk_size: u32,
}

/// Identifies a stored file (`file_info`, `delete_file`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Server limits for the next transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintsResponse {
    pub max_batch_size: u32,
    pub max_file_size: u32,
}

/// Final reply to an upload stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResultResponse {
    pub id: String,
    pub size: u32,
}

/// Terminates a download stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEndResponse {
    pub size: u32,
    pub chunks: u32,
}

/// Descriptor of one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfoResponse {
    pub id: String,
    pub filename: String,
    pub size: u32,
}

/// Listing of stored files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub total: u32,
    #[serde(default)]
    pub files: Vec<FileInfoResponse>,
}

/// Generic result of an operation without a richer payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
