//! Presence tracker: per-room membership keyed by connection id.
//!
//! DESIGN
//! ======
//! Membership is the per-room map connection id -> display name, kept in
//! join order. The first join for a room creates it in the registry. Leave
//! and disconnect report whether the room is now empty; the event router
//! owns the follow-up eviction so presence never reaches into registry
//! cleanup itself.
//!
//! Display names are not unique; identity is the connection id. A blank
//! name, or one squatting on the reserved guest prefix, gets a generated
//! `guest-XXXX` name instead.

use rand::Rng;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::protocol::{RoomUser, ServerEvent};
use crate::state::{AppState, Participant};

/// Names starting with this prefix are reserved for generated identities.
const GUEST_PREFIX: &str = "guest-";

// =============================================================================
// TYPES
// =============================================================================

/// Result of removing a connection from a room.
#[derive(Debug)]
pub struct LeaveOutcome {
    /// Display name the connection was registered under.
    pub username: String,
    /// Membership after removal, in join order.
    pub remaining: Vec<RoomUser>,
    /// True when the last participant just left; the caller must evict the
    /// room from the registry.
    pub now_empty: bool,
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Register a connection in a room, creating the room if absent. Returns
/// the display name actually registered.
///
/// A duplicate join by the same connection refreshes its sender but does
/// not add a second membership entry.
pub async fn join(
    state: &AppState,
    room_id: &str,
    conn_id: Uuid,
    username: &str,
    tx: mpsc::Sender<ServerEvent>,
) -> String {
    let mut rooms = state.rooms.write().await;
    let room = rooms.entry(room_id.to_string()).or_default();

    if let Some(existing) = room.users.iter().find(|p| p.conn_id == conn_id) {
        let username = existing.username.clone();
        room.clients.insert(conn_id, tx);
        info!(%room_id, %conn_id, "duplicate join ignored");
        return username;
    }

    let username = normalize_username(username);
    room.clients.insert(conn_id, tx);
    room.users.push(Participant { conn_id, username: username.clone() });
    info!(%room_id, %conn_id, %username, participants = room.users.len(), "client joined room");
    username
}

/// Remove a connection from a room. Returns `None` when the connection was
/// not a member (or the room does not exist).
pub async fn leave(state: &AppState, room_id: &str, conn_id: Uuid) -> Option<LeaveOutcome> {
    let mut rooms = state.rooms.write().await;
    let room = rooms.get_mut(room_id)?;
    let position = room.users.iter().position(|p| p.conn_id == conn_id)?;

    let participant = room.users.remove(position);
    room.clients.remove(&conn_id);
    info!(%room_id, %conn_id, remaining = room.users.len(), "client left room");

    Some(LeaveOutcome {
        username: participant.username,
        remaining: to_room_users(&room.users),
        now_empty: room.users.is_empty(),
    })
}

/// Transport-level disconnect: remove the connection from every room that
/// contains it. Returns one outcome per affected room.
pub async fn disconnect(state: &AppState, conn_id: Uuid) -> Vec<(String, LeaveOutcome)> {
    let mut rooms = state.rooms.write().await;
    let mut outcomes = Vec::new();
    for (room_id, room) in rooms.iter_mut() {
        let Some(position) = room.users.iter().position(|p| p.conn_id == conn_id) else {
            continue;
        };
        let participant = room.users.remove(position);
        room.clients.remove(&conn_id);
        info!(room_id = %room_id, %conn_id, remaining = room.users.len(), "client disconnected from room");
        outcomes.push((
            room_id.clone(),
            LeaveOutcome {
                username: participant.username,
                remaining: to_room_users(&room.users),
                now_empty: room.users.is_empty(),
            },
        ));
    }
    outcomes
}

/// Current membership of a room in join order; empty for an absent room.
pub async fn list(state: &AppState, room_id: &str) -> Vec<RoomUser> {
    let rooms = state.rooms.read().await;
    rooms.get(room_id).map(|room| to_room_users(&room.users)).unwrap_or_default()
}

// =============================================================================
// HELPERS
// =============================================================================

fn to_room_users(users: &[Participant]) -> Vec<RoomUser> {
    users
        .iter()
        .map(|p| RoomUser { id: p.conn_id, username: p.username.clone() })
        .collect()
}

/// Blank names and names claiming the reserved guest prefix are replaced
/// with a generated one.
fn normalize_username(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with(GUEST_PREFIX) {
        let suffix: u16 = rand::rng().random_range(1000..10000);
        return format!("{GUEST_PREFIX}{suffix}");
    }
    trimmed.to_string()
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
