//! WebSocket server for the chunked file service.
//!
//! Accepts any number of client connections, dispatches JSON and binary
//! messages to a [`Handler`], and routes upload chunk frames into per-stream
//! channels consumed by the transfer core. [`FileServiceApi`] is the handler
//! that binds the wire surface to a [`filesvc_transfer::FileStore`].

mod api;
mod config;
mod connection;
mod handler;
mod server;
mod stream;

pub use api::FileServiceApi;
pub use config::ServerConfig;
pub use connection::{ClientConnection, SendError, Sender};
pub use handler::{Handler, HandlerFuture};
pub use server::FileServer;
pub use stream::DownloadSink;

/// Outbound queue depth per connection.
///
/// Kept small: download chunks wait on this queue, so its depth bounds how
/// many chunk frames a slow client can leave buffered in memory.
pub const SEND_BUFFER_SIZE: usize = 32;

/// Inbound queue depth per upload stream.
pub const UPLOAD_BUFFER_SIZE: usize = 8;

/// Errors produced by the file server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("server already running")]
    AlreadyRunning,

    #[error("connection rejected")]
    ConnectionRejected,
}
