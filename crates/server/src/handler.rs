//! Handler trait for processing client messages.
//!
//! Implementors provide the file service logic while the server framework
//! handles connection management, routing, and the binary chunk frames.

use std::future::Future;
use std::pin::Pin;

use filesvc_protocol::MessageType;
use filesvc_protocol::constants::WS_ERR_CODE_NOT_IMPLEMENTED;
use filesvc_protocol::envelope::Message;
use filesvc_transfer::ChannelSource;

use crate::connection::Sender;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling messages from a connected client.
///
/// Each method receives:
/// - `sender`: channel to send responses back to the client
/// - `msg`: the parsed JSON envelope of the request
///
/// Default implementations reply with 501 so handlers only need to override
/// the message types they serve.
pub trait Handler: Send + Sync + 'static {
    /// Called for `ping` messages.
    fn on_ping(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if let Ok(reply) = msg.reply(MessageType::Pong, Option::<&()>::None) {
                let _ = sender.send_msg(reply).await;
            }
        })
    }

    /// Called for `constraints`.
    fn on_constraints(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender
                .send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented")
                .await;
        })
    }

    /// Called for `upload_open`.
    ///
    /// `source` yields the chunks the client sends under the same stream id
    /// and ends cleanly on `upload_close`. If the connection drops first,
    /// the next read fails. The handler owns the reply (`upload_result` or
    /// `error`).
    fn on_upload(&self, sender: Sender, msg: Message, source: ChannelSource) -> HandlerFuture<'_> {
        drop(source);
        Box::pin(async move {
            let _ = sender
                .send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "upload not implemented")
                .await;
        })
    }

    /// Called for `download`.
    fn on_download(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender
                .send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "download not implemented")
                .await;
        })
    }

    /// Called for `file_info`.
    fn on_file_info(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender
                .send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented")
                .await;
        })
    }

    /// Called for `list_files`.
    fn on_list_files(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender
                .send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented")
                .await;
        })
    }

    /// Called for `delete_file`.
    fn on_delete_file(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender
                .send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented")
                .await;
        })
    }

    /// Called when a client disconnects (cleanup hook).
    fn on_disconnected(&self) -> HandlerFuture<'_> {
        Box::pin(async {})
    }
}
