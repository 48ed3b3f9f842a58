//! WebSocket handler: the per-room event router.
//!
//! DESIGN
//! ======
//! On upgrade, each connection gets an id and a bounded mpsc channel, then
//! enters a `select!` loop:
//! - Incoming client frames → decode + dispatch by event kind
//! - Broadcast events from room peers → forward to the socket
//!
//! Dispatch returns the events owed to the sender (snapshots, membership
//! queries); room-wide effects go out through `room::broadcast`, which
//! reaches the sender too via its own channel. The server's processing
//! order is the authoritative order: each event completes its mutation and
//! fan-out before the next frame from that connection is read.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → loop
//! 2. `join-room` registers the connection's sender with the room
//! 3. Socket close → implicit leave from every joined room, empty-room
//!    eviction included. No grace period: a reconnecting client re-joins
//!    and receives a fresh snapshot.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::protocol::{ClientEvent, ServerEvent, decode_client_event};
use crate::services::{presence, room, throttle};
use crate::state::AppState;

/// Outbound channel depth per connection. A client that falls this far
/// behind starts losing broadcasts (best-effort delivery).
const CLIENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast events from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<ServerEvent>(CLIENT_CHANNEL_CAPACITY);

    info!(%conn_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_client_event(&state, conn_id, &client_tx, &text).await;
                        for event in replies {
                            // A failed send surfaces as a closed socket on
                            // the next recv; no need to tear down here.
                            let _ = send_event(&mut socket, &event).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = client_rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    // Implicit leave: scan every room for this connection, notify the
    // remaining members, and evict rooms that just emptied.
    for (room_id, outcome) in presence::disconnect(&state, conn_id).await {
        announce_departure(&state, &room_id, outcome).await;
    }
    info!(%conn_id, "ws: client disconnected");
}

// =============================================================================
// EVENT DISPATCH
// =============================================================================

/// Decode and process one inbound text frame, returning events owed to the
/// sending connection. Separated from the socket loop so tests can drive
/// dispatch end-to-end over plain channels.
pub(crate) async fn process_client_event(
    state: &AppState,
    conn_id: Uuid,
    client_tx: &mpsc::Sender<ServerEvent>,
    text: &str,
) -> Vec<ServerEvent> {
    let event = match decode_client_event(text) {
        Ok(event) => event,
        Err(e) => {
            // Malformed input is dropped, never echoed to other clients.
            warn!(%conn_id, error = %e, "ws: dropped invalid inbound frame");
            return Vec::new();
        }
    };

    match event {
        ClientEvent::JoinRoom { room_id, username } => {
            let username = presence::join(state, &room_id, conn_id, &username, client_tx.clone()).await;
            room::broadcast(state, &room_id, &ServerEvent::UserJoined { username }).await;
            let users = presence::list(state, &room_id).await;
            room::broadcast(state, &room_id, &ServerEvent::RoomUsers { users }).await;
            // The joiner always gets a full snapshot, never a delta replay.
            vec![room::snapshot(state, &room_id).await]
        }
        ClientEvent::LeaveRoom { room_id, .. } => {
            // Identity is the connection id; the payload username is advisory.
            match presence::leave(state, &room_id, conn_id).await {
                Some(outcome) => announce_departure(state, &room_id, outcome).await,
                None => warn!(%conn_id, %room_id, "ws: leave-room from non-member dropped"),
            }
            Vec::new()
        }
        ClientEvent::GetUsers { room_id } => {
            vec![ServerEvent::RoomUsers { users: presence::list(state, &room_id).await }]
        }
        ClientEvent::GetRoomState { room_id } => {
            vec![room::snapshot(state, &room_id).await]
        }
        ClientEvent::SendMessage { room_id, msg } => {
            if room::append_message(state, &room_id, msg.clone()).await {
                // Includes the sender, as delivery confirmation.
                room::broadcast(state, &room_id, &ServerEvent::ReceiveMessage { msg }).await;
            } else {
                warn!(%conn_id, %room_id, "ws: send-message for nonexistent room dropped");
            }
            Vec::new()
        }
        ClientEvent::CodeUpdate { room_id, code } => {
            if room::replace_code(state, &room_id, code.clone()).await {
                room::broadcast(state, &room_id, &ServerEvent::CodeUpdate { code }).await;
            } else {
                warn!(%conn_id, %room_id, "ws: code-update for nonexistent room dropped");
            }
            Vec::new()
        }
        ClientEvent::WhiteboardUpdate { room_id, data } => {
            match room::apply_whiteboard(state, &room_id, data).await {
                Some(applied) => throttle::enqueue(state, &room_id, applied).await,
                None => warn!(%conn_id, %room_id, "ws: whiteboard-update dropped"),
            }
            Vec::new()
        }
    }
}

/// Notify the remaining members of a departure and evict the room when the
/// last participant is gone. Eviction is the only cleanup path for room
/// state, so it must run on every empty transition.
async fn announce_departure(state: &AppState, room_id: &str, outcome: presence::LeaveOutcome) {
    if outcome.now_empty {
        room::remove(state, room_id).await;
        return;
    }
    room::broadcast(state, room_id, &ServerEvent::UserLeft { username: outcome.username }).await;
    room::broadcast(state, room_id, &ServerEvent::RoomUsers { users: outcome.remaining }).await;
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize event");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
