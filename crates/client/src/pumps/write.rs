//! Serialises outbound frames onto the socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Writes queued messages in order until cancelled, the queue closes, or a
/// write fails. Sends a close frame on the way out.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(msg) = msg else { break };
                let closing = matches!(msg, tungstenite::Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    error!("WebSocket write error: {e}");
                    return;
                }
                if closing {
                    debug!("close frame sent");
                    return;
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::sink;

    use super::*;

    fn capture() -> (
        impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
        mpsc::Receiver<tungstenite::Message>,
    ) {
        let (tx, rx) = mpsc::channel::<tungstenite::Message>(16);
        let sink = sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        });
        (Box::pin(sink), rx)
    }

    #[tokio::test]
    async fn stops_on_cancel_with_close_frame() {
        let (sink, mut out) = capture();
        let cancel = CancellationToken::new();
        let (_write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(sink, write_rx, cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        assert!(matches!(out.recv().await, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test]
    async fn preserves_queue_order() {
        let (sink, mut out) = capture();
        let (write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(sink, write_rx, CancellationToken::new()));

        write_tx.send(tungstenite::Message::Text("a".into())).await.unwrap();
        write_tx.send(tungstenite::Message::Binary(vec![1, 2].into())).await.unwrap();
        drop(write_tx);
        handle.await.unwrap();

        assert!(matches!(out.recv().await, Some(tungstenite::Message::Text(t)) if t.as_str() == "a"));
        assert!(matches!(out.recv().await, Some(tungstenite::Message::Binary(_))));
        assert!(matches!(out.recv().await, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test]
    async fn queued_close_ends_pump() {
        let (sink, mut out) = capture();
        let (write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(sink, write_rx, CancellationToken::new()));

        write_tx.send(tungstenite::Message::Close(None)).await.unwrap();
        handle.await.unwrap();

        assert!(matches!(out.recv().await, Some(tungstenite::Message::Close(_))));
        assert!(out.recv().await.is_none());
    }
}
