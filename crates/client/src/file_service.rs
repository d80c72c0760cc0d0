//! High-level file service client.

use filesvc_protocol::ProtocolVersion;
use filesvc_protocol::constants::{MessageType, WS_ERR_CODE_INTERNAL};
use filesvc_protocol::messages::{
    FileInfoResponse, FileRequest, ListFilesResponse, OperationResult,
};
use filesvc_transfer::{
    ChunkReader, ChunkWriter, Constraints, Direction, MetadataCarrier, Negotiator,
    TransferError, TransferSession,
};
use tokio::io::AsyncRead;
use tracing::{Span, debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::ws_client::WsClient;

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    /// Identifier assigned by the server's store.
    pub id: String,
    pub size: u32,
    /// Data chunks written; metadata-only frames are not counted.
    pub chunks: u32,
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    pub id: String,
    pub size: u32,
    pub chunks: u32,
    pub file: Vec<u8>,
}

/// Client for one file server connection.
///
/// Uploads and downloads run as [`TransferSession`]s under the client's
/// span. Several transfers may run concurrently on one client; each uses its
/// own stream id.
pub struct FileServiceClient {
    ws: WsClient,
    negotiator: Negotiator,
    version: ProtocolVersion,
    span: Span,
}

impl FileServiceClient {
    /// Connects to the server at `config.addr`.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let ws = WsClient::connect(config).await?;
        Ok(Self {
            ws,
            negotiator: Negotiator::new(config.protocol_version.into()),
            version: config.protocol_version,
            span: tracing::info_span!("file_service", component = "client"),
        })
    }

    /// Replaces the parent span transfers log under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// The underlying connection.
    pub fn ws(&self) -> &WsClient {
        &self.ws
    }

    /// Session constraints, fetched from the server on first use and cached
    /// for the life of the client.
    pub async fn constraints(&self) -> Result<Constraints, ClientError> {
        Ok(self.negotiator.session(&self.ws).await?)
    }

    /// Uploads everything `source` yields as `filename`.
    ///
    /// The filename is validated before anything is sent. Constraints come
    /// from the negotiator: cached for the session under protocol v1,
    /// refetched before every upload under v2.
    pub async fn upload<R>(&self, source: &mut R, filename: &str) -> Result<UploadResponse, ClientError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut session = TransferSession::new(Direction::Upload, &self.span);

        let (carrier, constraints) = session
            .negotiate(async {
                let carrier = MetadataCarrier::attach(self.version.into(), filename)?;
                let constraints = self.negotiator.for_upload(&self.ws).await?;
                Ok((carrier, constraints))
            })
            .await?;

        let (summary, stream) = session
            .stream(async {
                let writer = ChunkWriter::for_constraints(&constraints)?;
                let mut stream = self.ws.open_upload(self.version, carrier.headers()).await?;
                debug!(stream_id = stream.id(), chunk_size = writer.chunk_size(), "upload opened");
                let summary = writer
                    .stream(source, &mut stream, carrier.inline_filename())
                    .await?;
                Ok::<_, TransferError>((summary, stream))
            })
            .await?;

        let response = session
            .finalize(async move {
                let result = stream.result().await?;
                if result.size != summary.bytes_sent {
                    warn!(sent = summary.bytes_sent, stored = result.size, "server size differs");
                }
                info!(
                    file_id = %result.id,
                    %filename,
                    size = result.size,
                    chunks = summary.chunks_sent,
                    "upload stored"
                );
                Ok::<_, TransferError>(UploadResponse {
                    id: result.id,
                    size: result.size,
                    chunks: summary.chunks_sent,
                })
            })
            .await?;
        Ok(response)
    }

    /// Uploads an in-memory buffer.
    pub async fn upload_bytes(&self, data: &[u8], filename: &str) -> Result<UploadResponse, ClientError> {
        let mut source = data;
        self.upload(&mut source, filename).await
    }

    /// Downloads file `id` into memory.
    ///
    /// Chunks are requested at the session's negotiated chunk size and the
    /// download fails once it would exceed the negotiated file-size ceiling.
    pub async fn download(&self, id: &str) -> Result<DownloadResponse, ClientError> {
        let mut session = TransferSession::new(Direction::Download, &self.span);

        let constraints = session
            .negotiate(async {
                if id.is_empty() {
                    return Err(TransferError::Validation("file id is required".into()));
                }
                self.negotiator.session(&self.ws).await
            })
            .await?;

        let received = session
            .stream(async {
                let mut source = self.ws.open_download(id, constraints.max_chunk_size).await?;
                ChunkReader::new()
                    .with_limit(constraints.file_limit())
                    .drain(&mut source, None)
                    .await
            })
            .await?;

        let response = session
            .finalize(async move {
                info!(
                    file_id = id,
                    size = received.bytes_received,
                    chunks = received.chunks_received,
                    "download complete"
                );
                Ok(DownloadResponse {
                    id: id.to_string(),
                    size: received.bytes_received,
                    chunks: received.chunks_received,
                    file: received.buffer,
                })
            })
            .await?;
        Ok(response)
    }

    pub async fn file_info(&self, id: &str) -> Result<FileInfoResponse, ClientError> {
        let req = FileRequest { id: id.to_string() };
        let resp = self.ws.send_request(MessageType::FileInfo, Some(&req)).await?;
        Ok(resp.expect_payload()?)
    }

    pub async fn list_files(&self) -> Result<ListFilesResponse, ClientError> {
        let resp = self
            .ws
            .send_request::<()>(MessageType::ListFiles, None)
            .await?;
        Ok(resp.expect_payload()?)
    }

    /// Deletes file `id`. A reply with `success: false` is an error.
    pub async fn delete_file(&self, id: &str) -> Result<(), ClientError> {
        let req = FileRequest { id: id.to_string() };
        let resp = self.ws.send_request(MessageType::DeleteFile, Some(&req)).await?;
        let result: OperationResult = resp.expect_payload()?;
        if !result.success {
            return Err(ClientError::Remote {
                code: WS_ERR_CODE_INTERNAL,
                message: result.message,
            });
        }
        Ok(())
    }

    /// Closes the connection. In-flight transfers fail.
    pub async fn close(&self) {
        self.ws.close().await;
    }
}
