//! Websocket endpoint and the per-connection pump pair.
//!
//! Each connection runs two loops: an inbound pump decoding frames and
//! forwarding them to the hub, and an outbound pump draining the
//! connection's buffer back onto the wire. Neither direction may block the
//! other; the hub only ever touches the bounded buffer registered at join.
//! The pumps are generic over the frame transport so they can be driven by
//! channel-backed fakes in tests.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use ulid::Ulid;

use crate::hub::Hub;
use crate::protocol::{InboundFrame, Message};
use crate::session::{self, UserData};
use crate::state::AppState;

/// Capacity of each connection's outbound buffer. A member further behind
/// than this starts losing messages (best-effort fan-out).
const OUTBOUND_BUFFER: usize = 256;

/// Websocket upgrade handler. Identity is fixed from the request headers
/// before the upgrade; the socket never carries it.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user = session::user_data_from_headers(&headers);
    tracing::info!(name = %user.name(), "websocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, user, state))
}

async fn handle_socket(socket: WebSocket, user: UserData, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, user, &state.hub).await;
}

/// Drive one connection from registration to teardown.
///
/// Join happens before either pump moves a byte, and exactly one leave is
/// issued no matter which pump dies first: the inbound pump ending (read
/// error, bad frame, close) triggers leave, which closes the buffer and
/// lets the outbound pump drain and exit; the outbound pump ending first
/// (write error) wins the select below and leads to the same leave.
async fn run_connection<Si, St, E>(sink: Si, stream: St, user: UserData, hub: &Hub)
where
    Si: Sink<WsMessage> + Unpin + Send + 'static,
    Si::Error: Display,
    St: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    let id = Ulid::new();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    hub.join(id, outbound_tx);

    let mut writer = tokio::spawn(write_pump(id, sink, outbound_rx));
    let mut writer_done = false;

    tokio::select! {
        _ = &mut writer => writer_done = true,
        _ = read_pump(id, stream, &user, hub) => {}
    }

    hub.leave(id);
    if !writer_done {
        // The leave closed the buffer; the writer drains it and exits.
        let _ = writer.await;
    }
    tracing::info!(conn = %id, name = %user.name(), "connection closed");
}

/// Inbound pump: decode frames, stamp sender and time, forward to the hub.
/// Any read error, malformed text frame, or binary frame is terminal for
/// the connection; the protocol has only JSON text frames.
async fn read_pump<St, E>(id: Ulid, mut stream: St, user: &UserData, hub: &Hub)
where
    St: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<InboundFrame>(&text) {
                Ok(inbound) => {
                    hub.forward(Message::stamped(user.name(), inbound.message)).await;
                }
                Err(e) => {
                    tracing::warn!(conn = %id, "malformed frame, closing connection: {}", e);
                    break;
                }
            },
            Ok(WsMessage::Binary(_)) => {
                tracing::warn!(conn = %id, "binary frame outside the protocol, closing connection");
                break;
            }
            Ok(WsMessage::Close(_)) => {
                tracing::debug!(conn = %id, "client closed the connection");
                break;
            }
            // Ping/pong are answered by the websocket layer.
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn = %id, "read error: {}", e);
                break;
            }
        }
    }
}

/// Outbound pump: serialize every hub-delivered message onto the wire.
/// Exits cleanly once the buffer is closed by leave and fully drained, or
/// early on a write error.
async fn write_pump<Si>(id: Ulid, mut sink: Si, mut outbound: mpsc::Receiver<Message>)
where
    Si: Sink<WsMessage> + Unpin,
    Si::Error: Display,
{
    while let Some(msg) = outbound.recv().await {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(conn = %id, "failed to encode message: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
            tracing::debug!(conn = %id, "write error: {}", e);
            return;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as frame_mpsc;
    use futures::stream;
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::time::Duration;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_secs(1);

    fn user(name: &str) -> UserData {
        let mut map = HashMap::new();
        map.insert("name".to_string(), serde_json::json!(name));
        UserData::from_map(map)
    }

    fn text(raw: &str) -> Result<WsMessage, Infallible> {
        Ok(WsMessage::Text(raw.to_string().into()))
    }

    /// Join a plain member so the tests can observe what the hub fans out.
    fn observer(hub: &Hub) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(16);
        hub.join(Ulid::new(), tx);
        rx
    }

    #[tokio::test]
    async fn inbound_frames_are_stamped_and_forwarded() {
        let hub = Hub::spawn();
        let mut rx = observer(&hub);
        let (sink, _wire) = frame_mpsc::channel(16);
        let frames = stream::iter(vec![text(r#"{"Message": "hi there"}"#)]);

        run_connection(sink, frames, user("alice"), &hub).await;

        let msg = timeout(TICK, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.message, "hi there");
        assert_eq!(msg.name, "alice");
        assert!(msg.when <= chrono::Utc::now());
    }

    #[tokio::test]
    async fn malformed_frame_is_terminal() {
        let hub = Hub::spawn();
        let mut rx = observer(&hub);
        let (sink, _wire) = frame_mpsc::channel(16);
        // A valid frame after the malformed one must never be forwarded.
        let frames = stream::iter(vec![
            text("not json at all"),
            text(r#"{"Message": "never sent"}"#),
        ]);

        run_connection(sink, frames, user("bob"), &hub).await;

        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn binary_frame_is_terminal() {
        let hub = Hub::spawn();
        let mut rx = observer(&hub);
        let (sink, _wire) = frame_mpsc::channel(16);
        let frames = stream::iter(vec![
            Ok::<_, Infallible>(WsMessage::Binary(vec![0x1f, 0x8b].into())),
            text(r#"{"Message": "never sent"}"#),
        ]);

        run_connection(sink, frames, user("bob"), &hub).await;

        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn closed_buffer_is_drained_before_exit() {
        let (tx, rx) = mpsc::channel(8);
        for i in 0..3 {
            tx.send(Message::stamped("carol", format!("m{i}")))
                .await
                .unwrap();
        }
        // What leave does: drop the hub's sender, closing the buffer.
        drop(tx);

        let (sink, mut wire) = frame_mpsc::channel(8);
        timeout(TICK, write_pump(Ulid::new(), sink, rx))
            .await
            .expect("pump should exit once the closed buffer is drained");

        for i in 0..3 {
            match wire.next().await.expect("queued message should be written") {
                WsMessage::Text(json) => assert!(json.contains(&format!("m{i}"))),
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        // Clean shutdown closes the sink.
        assert!(wire.next().await.is_none());
    }

    #[tokio::test]
    async fn write_error_tears_the_connection_down() {
        let hub = Hub::spawn();
        let (sink, wire) = frame_mpsc::channel(1);
        // Wire gone: the first write fails.
        drop(wire);

        let mut conn = tokio::spawn({
            let hub = hub.clone();
            async move {
                let frames = stream::pending::<Result<WsMessage, Infallible>>();
                run_connection(sink, frames, user("dave"), &hub).await;
            }
        });

        // The inbound side never ends on its own; only the failed write can
        // finish the connection. Keep nudging until it does.
        let result = timeout(TICK, async {
            loop {
                tokio::select! {
                    res = &mut conn => break res,
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {
                        hub.forward(Message::stamped("dave", "boom")).await;
                    }
                }
            }
        })
        .await
        .expect("write failure should end the connection");
        result.unwrap();
    }
}
