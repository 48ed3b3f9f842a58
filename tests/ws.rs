//! End-to-end exercise of the realtime channel over a real WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use collabroom::routes;
use collabroom::state::AppState;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bind an ephemeral port, serve the app, return the ws URL.
async fn spawn_server(throttle: Duration) -> String {
    let state = AppState::new(throttle);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    format!("ws://{addr}/ws")
}

async fn connect(url: &str) -> WsClient {
    let (socket, _response) = tokio_tungstenite::connect_async(url).await.expect("ws connect");
    socket
}

async fn send(socket: &mut WsClient, frame: Value) {
    socket
        .send(Message::text(frame.to_string()))
        .await
        .expect("ws send");
}

/// Receive frames until one with the given event name arrives, skipping
/// interleaved broadcasts (membership updates arrive concurrently with
/// direct replies).
async fn recv_event(socket: &mut WsClient, event: &str) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event}"))
            .expect("socket closed")
            .expect("ws recv");
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(text.as_str()).expect("frame json");
            if frame["event"] == event {
                return frame;
            }
        }
    }
}

#[tokio::test]
async fn full_room_lifecycle_over_websocket() {
    let url = spawn_server(Duration::from_millis(10)).await;

    // Alice joins a fresh room and receives the default snapshot.
    let mut alice = connect(&url).await;
    send(&mut alice, json!({"event": "join-room", "roomId": "r1", "username": "alice"})).await;
    let state = recv_event(&mut alice, "room-state").await;
    assert_eq!(state["messages"], json!([]));
    assert_eq!(state["code"], "");
    assert_eq!(state["whiteboard"]["objects"], json!([]));
    assert_eq!(state["whiteboard"]["backgroundColor"], "#ffffff");
    recv_event(&mut alice, "user-joined").await;

    // Bob joins; alice sees the arrival and the updated membership.
    let mut bob = connect(&url).await;
    send(&mut bob, json!({"event": "join-room", "roomId": "r1", "username": "bob"})).await;
    recv_event(&mut bob, "room-state").await;
    let joined = recv_event(&mut alice, "user-joined").await;
    assert_eq!(joined["username"], "bob");
    let users = recv_event(&mut alice, "room-users").await;
    assert_eq!(users["users"].as_array().expect("users array").len(), 2);

    // Alice draws; both ends receive the throttled broadcast.
    send(
        &mut alice,
        json!({
            "event": "whiteboard-update",
            "roomId": "r1",
            "data": {
                "type": "object-added",
                "object": {"id": "o1", "type": "rect", "left": 10, "top": 10, "width": 50, "height": 50}
            }
        }),
    )
    .await;
    for socket in [&mut alice, &mut bob] {
        let update = recv_event(socket, "whiteboard-update").await;
        assert_eq!(update["data"]["type"], "object-added");
        assert_eq!(update["data"]["object"]["id"], "o1");
    }

    // Code and chat are broadcast unthrottled, sender included.
    send(&mut alice, json!({"event": "code-update", "roomId": "r1", "code": "let x = 1;"})).await;
    send(
        &mut alice,
        json!({
            "event": "send-message",
            "roomId": "r1",
            "msg": {"id": "m1", "user": "alice", "text": "hi", "time": "10:00 AM"}
        }),
    )
    .await;
    for socket in [&mut alice, &mut bob] {
        let code = recv_event(socket, "code-update").await;
        assert_eq!(code["code"], "let x = 1;");
        let msg = recv_event(socket, "receive-message").await;
        assert_eq!(msg["msg"]["id"], "m1");
    }

    // A late query reflects every mutation so far.
    send(&mut bob, json!({"event": "get-room-state", "roomId": "r1"})).await;
    let state = recv_event(&mut bob, "room-state").await;
    assert_eq!(state["code"], "let x = 1;");
    assert_eq!(state["messages"][0]["text"], "hi");
    assert_eq!(state["whiteboard"]["objects"][0]["id"], "o1");

    // Bob's socket drops; alice sees the implicit leave.
    drop(bob);
    let left = recv_event(&mut alice, "user-left").await;
    assert_eq!(left["username"], "bob");
    let users = recv_event(&mut alice, "room-users").await;
    assert_eq!(users["users"].as_array().expect("users array").len(), 1);

    // Alice leaves explicitly; the room is evicted and a newcomer's query
    // sees a fresh default state, not the old contents.
    send(&mut alice, json!({"event": "leave-room", "roomId": "r1", "username": "alice"})).await;
    let mut carol = connect(&url).await;
    send(&mut carol, json!({"event": "get-room-state", "roomId": "r1"})).await;
    let state = recv_event(&mut carol, "room-state").await;
    assert_eq!(state["code"], "");
    assert_eq!(state["whiteboard"]["objects"], json!([]));
}

#[tokio::test]
async fn whiteboard_burst_is_coalesced_on_the_wire() {
    // Generous interval so all three updates land inside one window.
    let url = spawn_server(Duration::from_millis(200)).await;

    let mut alice = connect(&url).await;
    send(&mut alice, json!({"event": "join-room", "roomId": "burst", "username": "alice"})).await;
    recv_event(&mut alice, "room-state").await;

    // Three rapid-fire modifies to the same object within one interval.
    for left in [10, 20, 30] {
        send(
            &mut alice,
            json!({
                "event": "whiteboard-update",
                "roomId": "burst",
                "data": {
                    "type": "object-modified",
                    "object": {"id": "o1", "type": "rect", "left": left, "top": 0, "width": 5, "height": 5}
                }
            }),
        )
        .await;
    }

    // The first broadcast to arrive already carries the final position.
    let update = recv_event(&mut alice, "whiteboard-update").await;
    assert_eq!(update["data"]["object"]["left"], 30.0);
}
