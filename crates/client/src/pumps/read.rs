//! Reads the socket and routes what arrives.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use filesvc_protocol::constants::WS_PONG_WAIT;
use filesvc_protocol::envelope::Message;
use filesvc_protocol::parse_chunk_frame;

use crate::router::Router;

/// Routes text replies and download frames until the socket ends, goes
/// silent for [`WS_PONG_WAIT`], or the client is cancelled.
///
/// On exit the router is closed so every waiting request and stream fails
/// instead of hanging.
pub(crate) async fn read_pump<S>(
    mut read: S,
    router: Arc<Router>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    // Any inbound frame counts as liveness, not just pongs.
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!("no traffic within {WS_PONG_WAIT:?}, closing");
                break;
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                match msg {
                    tungstenite::Message::Text(text) => match serde_json::from_str::<Message>(&text) {
                        Ok(msg) => {
                            trace!(msg_type = ?msg.msg_type, id = %msg.id, "received message");
                            router.route_text(msg).await;
                        }
                        Err(e) => warn!("failed to parse message: {e}"),
                    },
                    tungstenite::Message::Binary(data) => match parse_chunk_frame(&data) {
                        Ok(frame) => router.route_frame(frame).await,
                        Err(e) => warn!("malformed chunk frame: {e}"),
                    },
                    tungstenite::Message::Ping(data) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Pong(_) => trace!("received pong"),
                    tungstenite::Message::Close(_) => {
                        debug!("received close frame");
                        break;
                    }
                    tungstenite::Message::Frame(_) => {}
                }
            }
        }
    }

    router.close();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use filesvc_protocol::constants::MessageType;
    use filesvc_protocol::messages::DownloadEndResponse;
    use filesvc_protocol::{ChunkHeader, encode_chunk_frame};
    use filesvc_transfer::ChunkSource;
    use futures_util::stream;

    use super::*;

    type Item = Result<tungstenite::Message, tungstenite::Error>;

    fn text(msg: &Message) -> Item {
        Ok(tungstenite::Message::Text(
            serde_json::to_string(msg).unwrap().into(),
        ))
    }

    #[tokio::test]
    async fn stream_end_closes_router() {
        let router = Arc::new(Router::default());
        let reply = router.expect_reply("req-1").unwrap();
        let (write_tx, _write_rx) = mpsc::channel(16);

        read_pump(
            stream::empty::<Item>(),
            Arc::clone(&router),
            write_tx,
            CancellationToken::new(),
        )
        .await;

        assert!(router.is_closed());
        assert!(reply.await.is_err());
    }

    #[tokio::test]
    async fn routes_replies_and_frames() {
        let router = Arc::new(Router::default());
        let reply = router.expect_reply("req-1").unwrap();
        let mut download = router.open_stream("d-1", 4).unwrap();
        let (write_tx, mut write_rx) = mpsc::channel(16);

        let header = ChunkHeader {
            id: "d-1".into(),
            msg_type: MessageType::DownloadChunk,
            filename: None,
        };
        let frame = encode_chunk_frame(&header, b"xyz").unwrap();
        let end = DownloadEndResponse { size: 3, chunks: 1 };
        let items: Vec<Item> = vec![
            Ok(tungstenite::Message::Ping(b"hi".to_vec().into())),
            text(&Message::new::<()>("req-1", MessageType::Pong, None).unwrap()),
            Ok(tungstenite::Message::Text("not json".into())),
            Ok(tungstenite::Message::Binary(frame.into())),
            Ok(tungstenite::Message::Binary(vec![0, 0].into())),
            text(&Message::new("d-1", MessageType::DownloadEnd, Some(&end)).unwrap()),
        ];

        read_pump(
            stream::iter(items),
            Arc::clone(&router),
            write_tx,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            write_rx.recv().await,
            Some(tungstenite::Message::Pong(data)) if data.as_ref() == b"hi"
        ));
        assert_eq!(reply.await.unwrap().msg_type, MessageType::Pong);
        assert_eq!(download.recv().await.unwrap().unwrap().payload, b"xyz");
        assert!(download.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_frame_stops_reading() {
        let router = Arc::new(Router::default());
        let reply = router.expect_reply("late").unwrap();
        let (write_tx, _write_rx) = mpsc::channel(16);
        let items: Vec<Item> = vec![
            Ok(tungstenite::Message::Close(None)),
            text(&Message::new::<()>("late", MessageType::Pong, None).unwrap()),
        ];

        read_pump(
            stream::iter(items),
            Arc::clone(&router),
            write_tx,
            CancellationToken::new(),
        )
        .await;

        assert!(reply.await.is_err());
    }

    #[tokio::test]
    async fn silence_times_out() {
        tokio::time::pause();
        let router = Arc::new(Router::default());
        let (write_tx, _write_rx) = mpsc::channel(16);

        read_pump(
            stream::pending::<Item>(),
            Arc::clone(&router),
            write_tx,
            CancellationToken::new(),
        )
        .await;

        assert!(router.is_closed());
    }

    #[tokio::test]
    async fn traffic_extends_deadline() {
        tokio::time::pause();
        let router = Arc::new(Router::default());
        let (write_tx, _write_rx) = mpsc::channel(16);

        let before = WS_PONG_WAIT - Duration::from_secs(1);
        let delayed = stream::once(async move {
            tokio::time::sleep(before).await;
            Ok::<_, tungstenite::Error>(tungstenite::Message::Pong(Vec::new().into()))
        });
        let items = Box::pin(delayed.chain(stream::pending()));

        let pump_router = Arc::clone(&router);
        let handle = tokio::spawn(async move {
            read_pump(items, pump_router, write_tx, CancellationToken::new()).await;
        });

        tokio::time::advance(WS_PONG_WAIT + Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!router.is_closed());

        tokio::time::advance(WS_PONG_WAIT).await;
        handle.await.unwrap();
        assert!(router.is_closed());
    }
}
