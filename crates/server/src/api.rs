//! File service handler: the wire surface bound to a [`FileStore`].

use std::sync::Arc;

use filesvc_protocol::ProtocolVersion;
use filesvc_protocol::constants::MessageType;
use filesvc_protocol::envelope::Message;
use filesvc_protocol::messages::{
    ConstraintsResponse, DownloadRequest, FileInfoResponse, FileRequest, ListFilesResponse,
    OperationResult, UploadOpenRequest, UploadResultResponse,
};
use filesvc_transfer::{
    ChannelSource, FileInfo, FileStore, FilenameResolver, Settings, TransferError,
    receive_upload, send_download,
};
use serde::Serialize;
use tracing::Span;

use crate::connection::Sender;
use crate::handler::{Handler, HandlerFuture};
use crate::stream::DownloadSink;

/// [`Handler`] serving uploads, downloads and the pass-through file
/// operations against a [`FileStore`], with limits taken from [`Settings`].
pub struct FileServiceApi<S, T> {
    store: Arc<S>,
    settings: T,
    protocol_version: ProtocolVersion,
    span: Span,
}

impl<S: FileStore, T: Settings> FileServiceApi<S, T> {
    /// Creates the service for the protocol version `settings` selects.
    pub fn new(store: Arc<S>, settings: T) -> Self {
        Self {
            protocol_version: settings.protocol_version(),
            store,
            settings,
            span: tracing::info_span!("file_service", component = "rpc"),
        }
    }

    /// Selects the protocol version clients must open uploads with.
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Replaces the parent span every transfer logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    async fn upload(
        &self,
        msg: &Message,
        mut source: ChannelSource,
    ) -> Result<UploadResultResponse, TransferError> {
        let req: UploadOpenRequest = msg
            .expect_payload()
            .map_err(|e| TransferError::Validation(e.to_string()))?;
        if req.protocol_version != self.protocol_version {
            return Err(TransferError::Validation(format!(
                "protocol version mismatch: client {}, server {}",
                req.protocol_version, self.protocol_version
            )));
        }

        let span = tracing::info_span!(parent: &self.span, "upload", stream = %msg.id);
        let resolver = FilenameResolver::new(req.protocol_version.into(), &req.headers);
        let stored = receive_upload(
            self.store.as_ref(),
            &mut source,
            resolver,
            self.settings.constraints(),
            &span,
        )
        .await?;

        Ok(UploadResultResponse {
            id: stored.id,
            size: stored.size,
        })
    }

    async fn download(&self, sender: Sender, msg: &Message) -> Result<(), TransferError> {
        let req: DownloadRequest = msg
            .expect_payload()
            .map_err(|e| TransferError::Validation(e.to_string()))?;

        let span =
            tracing::info_span!(parent: &self.span, "download", stream = %msg.id, file_id = %req.id);
        let mut sink = DownloadSink::new(sender, &msg.id);
        send_download(
            self.store.as_ref(),
            &req.id,
            &mut sink,
            req.chunk_size,
            self.settings.constraints(),
            &span,
        )
        .await?;
        Ok(())
    }
}

fn file_info_response(info: FileInfo) -> FileInfoResponse {
    FileInfoResponse {
        id: info.id,
        filename: info.filename,
        size: info.size,
    }
}

fn file_request(msg: &Message) -> Result<FileRequest, TransferError> {
    let req: FileRequest = msg
        .expect_payload()
        .map_err(|e| TransferError::Validation(e.to_string()))?;
    if req.id.is_empty() {
        return Err(TransferError::Validation("file id is required".into()));
    }
    Ok(req)
}

/// Sends `result` as a `msg_type` reply, or its error under the request id.
async fn respond<P: Serialize>(
    sender: &Sender,
    msg: &Message,
    msg_type: MessageType,
    result: Result<P, TransferError>,
) {
    let reply = match result {
        Ok(payload) => match msg.reply(msg_type, Some(&payload)) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("failed to encode {msg_type:?}: {e}");
                return;
            }
        },
        Err(e) => {
            tracing::debug!(request = %msg.id, code = e.code(), "request failed: {e}");
            msg.reply_error(e.code(), e.to_string())
        }
    };
    if sender.send_msg(reply).await.is_err() {
        tracing::debug!(request = %msg.id, "client gone before reply");
    }
}

impl<S: FileStore, T: Settings> Handler for FileServiceApi<S, T> {
    fn on_constraints(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let constraints = ConstraintsResponse::from(self.settings.constraints());
            respond(&sender, &msg, MessageType::ConstraintsResponse, Ok(constraints)).await;
        })
    }

    fn on_upload(&self, sender: Sender, msg: Message, source: ChannelSource) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = self.upload(&msg, source).await;
            respond(&sender, &msg, MessageType::UploadResult, result).await;
        })
    }

    fn on_download(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            // Success is signalled by `download_end`, sent by the sink.
            if let Err(e) = self.download(sender.clone(), &msg).await {
                let _ = sender.send_error(&msg, e.code(), &e.to_string()).await;
            }
        })
    }

    fn on_file_info(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = async {
                let req = file_request(&msg)?;
                let info = self.store.file_info(&req.id).await?;
                Ok::<_, TransferError>(file_info_response(info))
            }
            .await;
            respond(&sender, &msg, MessageType::FileInfoResponse, result).await;
        })
    }

    fn on_list_files(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = self
                .store
                .list_files()
                .await
                .map(|list| ListFilesResponse {
                    total: list.total,
                    files: list.files.into_iter().map(file_info_response).collect(),
                })
                .map_err(TransferError::from);
            respond(&sender, &msg, MessageType::ListFilesResponse, result).await;
        })
    }

    fn on_delete_file(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let result = async {
                let req = file_request(&msg)?;
                self.store.delete(&req.id).await?;
                tracing::info!(parent: &self.span, file_id = %req.id, "file deleted");
                Ok::<_, TransferError>(OperationResult {
                    success: true,
                    message: String::new(),
                })
            }
            .await;
            respond(&sender, &msg, MessageType::OperationResult, result).await;
        })
    }
}
