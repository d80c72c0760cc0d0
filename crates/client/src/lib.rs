//! Client for the chunked file service.
//!
//! [`WsClient`] owns the WebSocket: request/response correlation by message
//! id, routing of download chunk frames, and keepalive. [`FileServiceClient`]
//! layers the transfer core on top of it for uploads and downloads.

pub mod config;
pub mod error;
pub mod file_service;
mod pumps;
mod router;
pub mod stream;
pub mod ws_client;

pub use config::ClientConfig;
pub use error::ClientError;
pub use file_service::{DownloadResponse, FileServiceClient, UploadResponse};
pub use stream::UploadStream;
pub use ws_client::WsClient;
