use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{TransportState, WsChannel};
use crate::relay::RelayState;

/// How long a closing socket gets to flush queued frames and the close reply.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Drives one upgraded WebSocket until the client goes away or the relay
/// terminates it.
pub async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let channel = Arc::new(WsChannel::new(tx));

    let id = state.connect(channel.clone());
    info!(connection = %id, "client connected");

    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(err) = sender.send(message).await {
                debug!(connection = %id, error = %err, "websocket write failed");
                return;
            }
        }
        // Flushes the close handshake reply, if the client started one.
        if let Err(err) = sender.close().await {
            debug!(connection = %id, error = %err, "websocket close failed");
        }
        debug!(connection = %id, "writer task finished");
    });

    let mut terminated = false;
    loop {
        let frame = tokio::select! {
            frame = receiver.next() => frame,
            _ = channel.terminated() => {
                debug!(connection = %id, "connection terminated by relay");
                terminated = true;
                break;
            }
        };

        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                warn!(connection = %id, error = %err, "websocket connection error");
                break;
            }
            None => break,
        };

        match message {
            Message::Text(text) => state.handle_text(id, &text),
            Message::Binary(bytes) => state.handle_binary(id, &bytes),
            Message::Pong(_) => state.mark_alive(id),
            Message::Ping(_) => {}
            Message::Close(frame) => {
                channel.set_state(TransportState::Closing);
                info!(
                    connection = %id,
                    code = ?frame.as_ref().map(|f| f.code),
                    reason = ?frame.as_ref().map(|f| f.reason.to_string()),
                    "client disconnected"
                );
                break;
            }
        }
    }

    channel.set_state(TransportState::Closed);
    state.disconnect(id);

    // The registry released its handle above; dropping ours ends the writer's queue.
    drop(channel);
    if terminated || tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    debug!(connection = %id, "websocket closed");
}
