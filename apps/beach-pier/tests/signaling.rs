use std::net::SocketAddr;
use std::time::Duration;

use beach_pier::handlers::{router, AppState};
use beach_pier::relay::RelayState;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, RelayState) {
    let relay = RelayState::new();
    let app = router(AppState::new(relay.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server");
    });
    (addr, relay)
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("websocket handshake");
    ws
}

async fn send_text(ws: &mut Client, text: &str) {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .expect("send frame");
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("json frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

fn room_state(participants: usize) -> Value {
    json!({"type": "roomState", "participants": participants, "capacity": 2})
}

#[test_timeout::tokio_timeout_test(30)]
async fn pairs_two_clients_and_relays_signals() {
    let (addr, _relay) = spawn_server().await;

    let mut c1 = connect(addr, "/").await;
    assert_eq!(next_json(&mut c1).await, room_state(0));
    let mut c2 = connect(addr, "/ws").await;
    assert_eq!(next_json(&mut c2).await, room_state(0));

    send_text(&mut c1, r#"{"type":"ready"}"#).await;
    assert_eq!(next_json(&mut c1).await, room_state(1));
    assert_eq!(next_json(&mut c2).await, room_state(1));

    send_text(&mut c2, r#"{"type":"ready"}"#).await;
    assert_eq!(next_json(&mut c1).await, room_state(2));
    assert_eq!(next_json(&mut c1).await, json!({"type": "startOffer"}));
    assert_eq!(
        next_json(&mut c1).await,
        json!({"type": "status", "message": "Connecting..."})
    );
    assert_eq!(next_json(&mut c2).await, room_state(2));
    assert_eq!(
        next_json(&mut c2).await,
        json!({"type": "status", "message": "Connecting..."})
    );

    send_text(&mut c1, r#"{"type":"candidate","sdp":"X"}"#).await;
    assert_eq!(
        next_json(&mut c2).await,
        json!({"type": "candidate", "sdp": "X"})
    );

    send_text(&mut c2, r#"{"type":"answer","sdp":"v=0"}"#).await;
    assert_eq!(
        next_json(&mut c1).await,
        json!({"type": "answer", "sdp": "v=0"})
    );
}

#[test_timeout::tokio_timeout_test(30)]
async fn closing_a_socket_hangs_up_the_peer() {
    let (addr, relay) = spawn_server().await;

    let mut c1 = connect(addr, "/ws").await;
    let mut c2 = connect(addr, "/ws").await;
    next_json(&mut c1).await;
    next_json(&mut c2).await;

    send_text(&mut c1, r#"{"type":"ready"}"#).await;
    send_text(&mut c2, r#"{"type":"ready"}"#).await;
    // roomState(1), roomState(2), status
    for _ in 0..3 {
        next_json(&mut c2).await;
    }

    c1.close(None).await.expect("close c1");

    assert_eq!(next_json(&mut c2).await, room_state(1));
    assert_eq!(next_json(&mut c2).await, json!({"type": "hangup"}));
    assert_eq!(relay.room_snapshot().participants, 1);
    assert_eq!(relay.connection_count(), 1);
}

#[test_timeout::tokio_timeout_test(30)]
async fn third_client_gets_room_full_and_malformed_input_gets_an_error() {
    let (addr, _relay) = spawn_server().await;

    let mut c1 = connect(addr, "/ws").await;
    let mut c2 = connect(addr, "/ws").await;
    next_json(&mut c1).await;
    next_json(&mut c2).await;
    send_text(&mut c1, r#"{"type":"ready"}"#).await;
    send_text(&mut c2, r#"{"type":"ready"}"#).await;
    for _ in 0..3 {
        next_json(&mut c2).await;
    }

    let mut c3 = connect(addr, "/ws").await;
    assert_eq!(next_json(&mut c3).await, room_state(2));

    send_text(&mut c3, r#"{"type":"ready"}"#).await;
    assert_eq!(
        next_json(&mut c3).await,
        json!({"type": "roomFull", "message": "Room is full"})
    );
    assert_eq!(next_json(&mut c3).await, room_state(2));

    send_text(&mut c3, "definitely not json").await;
    assert_eq!(
        next_json(&mut c3).await,
        json!({"type": "error", "message": "Invalid JSON payload"})
    );

    send_text(&mut c3, r#"{"payload":1}"#).await;
    assert_eq!(
        next_json(&mut c3).await,
        json!({"type": "error", "message": "Missing message type"})
    );
}

#[test_timeout::tokio_timeout_test(30)]
async fn client_close_gets_a_close_reply() {
    let (addr, relay) = spawn_server().await;

    let mut c1 = connect(addr, "/ws").await;
    assert_eq!(next_json(&mut c1).await, room_state(0));

    c1.close(None).await.expect("close c1");
    let reply = tokio::time::timeout(Duration::from_secs(5), c1.next())
        .await
        .expect("timed out waiting for the close reply");
    assert!(
        matches!(reply, Some(Ok(Message::Close(_)))),
        "expected a close frame, got {reply:?}"
    );
    assert_eq!(relay.connection_count(), 0);
}

#[test_timeout::tokio_timeout_test(30)]
async fn heartbeat_keeps_ponging_clients_and_reaps_silent_ones() {
    let (addr, relay) = spawn_server().await;

    let mut c1 = connect(addr, "/ws").await;
    let mut c2 = connect(addr, "/ws").await;
    next_json(&mut c1).await;
    next_json(&mut c2).await;
    send_text(&mut c1, r#"{"type":"ready"}"#).await;
    send_text(&mut c2, r#"{"type":"ready"}"#).await;
    // roomState(1), roomState(2), startOffer, status
    for _ in 0..4 {
        next_json(&mut c1).await;
    }
    for _ in 0..3 {
        next_json(&mut c2).await;
    }

    // c1 keeps reading, so its client answers pings; c2 is never polled again.
    let heartbeat = relay.spawn_heartbeat(Duration::from_millis(50));

    assert_eq!(next_json(&mut c1).await, room_state(1));
    assert_eq!(next_json(&mut c1).await, json!({"type": "hangup"}));

    // Several more intervals pass while c1 stays responsive.
    let quiet = tokio::time::timeout(Duration::from_millis(300), next_json(&mut c1)).await;
    assert!(quiet.is_err(), "unexpected message: {quiet:?}");
    assert_eq!(relay.connection_count(), 1);
    assert_eq!(relay.room_snapshot().participants, 1);

    heartbeat.shutdown().await;
    drop(c2);
}
