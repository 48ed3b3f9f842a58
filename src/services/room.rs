//! Room registry: authoritative room state and fan-out.
//!
//! DESIGN
//! ======
//! Rooms are created lazily by the presence tracker on first join and
//! evicted when the last participant leaves. Mutation events against a
//! room that does not exist are no-ops: only `join-room` may create a
//! room, so stray stale events cannot resurrect an abandoned one.
//!
//! Every mutation runs under a single write lock acquisition, which makes
//! it atomic with respect to concurrent events from other connections.

use tracing::{debug, info};

use crate::protocol::{ChatMessage, ServerEvent};
use crate::services::whiteboard::{self, WhiteboardDelta, WhiteboardDoc};
use crate::state::AppState;

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Full current room state for one connection (join or `get-room-state`).
///
/// An absent room yields the default empty state without creating the room;
/// a reconnecting client polling an evicted room sees a fresh board, not
/// stale data.
pub async fn snapshot(state: &AppState, room_id: &str) -> ServerEvent {
    let rooms = state.rooms.read().await;
    match rooms.get(room_id) {
        Some(room) => ServerEvent::RoomState {
            messages: room.messages.clone(),
            code: room.code.clone(),
            whiteboard: room.whiteboard.clone(),
        },
        None => ServerEvent::RoomState {
            messages: Vec::new(),
            code: String::new(),
            whiteboard: WhiteboardDoc::default(),
        },
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Append a chat message. Returns false (no-op) if the room does not exist.
pub async fn append_message(state: &AppState, room_id: &str, msg: ChatMessage) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    room.messages.push(msg);
    true
}

/// Replace the whole code buffer. Returns false if the room does not exist.
pub async fn replace_code(state: &AppState, room_id: &str, code: String) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    room.code = code;
    true
}

/// Reconcile one whiteboard delta into the room's document. Returns the
/// normalized delta to broadcast, or `None` when the room does not exist
/// or the delta kind is unknown.
pub async fn apply_whiteboard(
    state: &AppState,
    room_id: &str,
    delta: WhiteboardDelta,
) -> Option<WhiteboardDelta> {
    let mut rooms = state.rooms.write().await;
    let room = rooms.get_mut(room_id)?;
    let applied = whiteboard::apply(&mut room.whiteboard, delta);
    debug!(%room_id, objects = room.whiteboard.objects.len(), "whiteboard reconciled");
    applied
}

// =============================================================================
// EVICTION
// =============================================================================

/// Evict a room from the registry. Idempotent; the only cleanup path for
/// room state, invoked when membership drops to zero.
pub async fn remove(state: &AppState, room_id: &str) {
    let mut rooms = state.rooms.write().await;
    if rooms.remove(room_id).is_some() {
        info!(%room_id, "evicted room from memory");
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Broadcast an event to all clients in a room.
///
/// Best-effort: a client whose channel is full or closed is skipped. There
/// is no redelivery; a reconnecting client re-issues `get-room-state`.
pub async fn broadcast(state: &AppState, room_id: &str, event: &ServerEvent) {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(room_id) else {
        return;
    };
    for tx in room.clients.values() {
        let _ = tx.try_send(event.clone());
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
