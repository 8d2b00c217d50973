use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use pressroom_core::config::{HANDSHAKE_TIMEOUT_MS, MAX_PAYLOAD_BYTES};
use pressroom_core::{EventKind, PressroomError};
use pressroom_protocol::{ClientFrame, ServerFrame};
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::ws::handshake;

type WsStream = SplitStream<WebSocket>;

/// Write half of the socket. Every send is bounded by `limit` so a peer that
/// stops reading cannot park the connection task forever.
struct Outbound<S> {
    sink: S,
    limit: Duration,
}

impl<S> Outbound<S>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    fn new(sink: S, limit: Duration) -> Self {
        Self { sink, limit }
    }

    async fn send_message(&mut self, msg: Message) -> Result<(), axum::Error> {
        match tokio::time::timeout(self.limit, self.sink.send(msg)).await {
            Ok(sent) => sent,
            Err(_) => Err(axum::Error::new(format!(
                "socket send timed out after {}s",
                self.limit.as_secs()
            ))),
        }
    }

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), axum::Error> {
        self.send_message(Message::Text(frame.to_text().into())).await
    }

    async fn close(&mut self) {
        let _ = self.send_message(Message::Close(None)).await;
    }

    async fn close_with_error(&mut self, err: &PressroomError) {
        let _ = self.send(&error_frame(err)).await;
        self.close().await;
    }
}

type WsOutbound = Outbound<SplitSink<WebSocket, Message>>;

/// Axum handler: upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_PAYLOAD_BYTES)
        .on_upgrade(|socket| run_connection(socket, state))
}

/// Per-connection task: handshake, snapshot, then forward the observer's
/// queue until either side goes away.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut rx) = socket.split();
    let send_limit = Duration::from_secs(state.config.broadcast.heartbeat_interval_secs.max(1));
    let mut tx = Outbound::new(sink, send_limit);

    let deadline = Duration::from_millis(HANDSHAKE_TIMEOUT_MS);
    let (token, kinds) = match tokio::time::timeout(deadline, await_connect(&mut tx, &mut rx)).await
    {
        Ok(Some(connect)) => connect,
        Ok(None) => return,
        Err(_) => {
            warn!("handshake timeout");
            tx.close().await;
            return;
        }
    };

    if let Err(e) = handshake::verify_auth(token.as_deref(), &state.config.gateway.auth) {
        warn!(error = %e, "observer auth failed");
        tx.close_with_error(&e).await;
        return;
    }

    let mut observer = match state.broadcast.connect(kinds) {
        Ok(o) => o,
        Err(e) => {
            tx.close_with_error(&e.into()).await;
            return;
        }
    };
    let observer_id = observer.id.clone();

    let snapshot = handshake::snapshot(state.scheduler.list());
    if tx.send(&snapshot).await.is_err() {
        let _ = state.broadcast.disconnect(&observer_id);
        return;
    }

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_frame(&observer_id, text.as_str(), &mut tx, &state).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = state.broadcast.record_heartbeat(&observer_id);
                        if tx.send_message(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        let _ = state.broadcast.record_heartbeat(&observer_id);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        debug!(observer_id, "ignoring binary frame");
                    }
                    Some(Err(e)) => {
                        debug!(observer_id, error = %e, "socket error");
                        break;
                    }
                }
            }

            outbound = observer.rx.recv() => {
                match outbound {
                    Some(text) => {
                        if let Err(e) = tx.send_message(Message::Text(text.into())).await {
                            debug!(observer_id, error = %e, "dropping observer");
                            break;
                        }
                    }
                    None => {
                        // pruned by the manager (slow or silent)
                        tx.close().await;
                        break;
                    }
                }
            }
        }
    }

    if state.broadcast.disconnect(&observer_id).is_err() {
        debug!(observer_id, "observer already pruned");
    }
    info!(observer_id, "WS connection closed");
}

/// Read frames until the client sends `connect`. Anything else before it is
/// answered with a protocol error. Returns `None` if the socket closes.
async fn await_connect(
    tx: &mut WsOutbound,
    rx: &mut WsStream,
) -> Option<(Option<String>, Vec<EventKind>)> {
    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match ClientFrame::parse(text.as_str()) {
                Ok(ClientFrame::Connect { token, kinds }) => return Some((token, kinds)),
                Ok(_) => {
                    let err = PressroomError::Protocol("must connect first".into());
                    if tx.send(&error_frame(&err)).await.is_err() {
                        return None;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "malformed frame before connect");
                    let err = PressroomError::Protocol(format!("malformed frame: {e}"));
                    if tx.send(&error_frame(&err)).await.is_err() {
                        return None;
                    }
                }
            },
            Ok(Message::Ping(data)) => {
                if tx.send_message(Message::Pong(data)).await.is_err() {
                    return None;
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

/// Handle one post-handshake client frame. `Err` means the socket is gone.
async fn handle_frame(
    observer_id: &str,
    text: &str,
    tx: &mut WsOutbound,
    state: &AppState,
) -> Result<(), axum::Error> {
    let frame = match ClientFrame::parse(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(observer_id, error = %e, "malformed frame");
            let err = PressroomError::Protocol(format!("malformed frame: {e}"));
            return tx.send(&error_frame(&err)).await;
        }
    };

    match frame {
        ClientFrame::Ping => {
            let _ = state.broadcast.record_heartbeat(observer_id);
            tx.send(&ServerFrame::Pong).await
        }
        ClientFrame::Pong => {
            let _ = state.broadcast.record_heartbeat(observer_id);
            Ok(())
        }
        ClientFrame::Subscribe { kinds } => match state.broadcast.subscribe(observer_id, kinds) {
            Ok(()) => Ok(()),
            Err(e) => tx.send(&error_frame(&e.into())).await,
        },
        ClientFrame::Connect { .. } => {
            let err = PressroomError::Protocol("already connected".into());
            tx.send(&error_frame(&err)).await
        }
    }
}

fn error_frame(err: &PressroomError) -> ServerFrame {
    ServerFrame::error(err.code(), &err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// A peer that never drains its receive buffer.
    struct Stalled;

    impl Sink<Message> for Stalled {
        type Error = axum::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_send_times_out() {
        let mut tx = Outbound::new(Stalled, Duration::from_secs(30));
        let started = tokio::time::Instant::now();

        let err = tx.send(&ServerFrame::Pong).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(started.elapsed(), Duration::from_secs(30));

        // close gives up the same way instead of hanging
        tx.close_with_error(&PressroomError::Protocol("bye".into())).await;
        assert_eq!(started.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn ready_peer_receives_the_frame() {
        let sink = Vec::<Message>::new()
            .sink_map_err(|never: std::convert::Infallible| -> axum::Error { match never {} });
        let mut tx = Outbound::new(sink, Duration::from_secs(30));

        tx.send(&ServerFrame::Pong).await.unwrap();
        match tx.sink.get_ref().as_slice() {
            [Message::Text(text)] => assert!(text.as_str().contains("pong")),
            other => panic!("unexpected messages {other:?}"),
        }
    }
}
