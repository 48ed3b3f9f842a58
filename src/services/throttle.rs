//! Fan-out throttler: trailing-edge coalescing for whiteboard broadcasts.
//!
//! DESIGN
//! ======
//! Continuous drawing gestures produce deltas far faster than peers need
//! to repaint. Each room keeps one "latest pending" delta and at most one
//! running flush timer: enqueue overwrites the pending slot, and when the
//! timer fires the latest delta is broadcast and the slot cleared. Earlier
//! deltas in a burst are superseded, never queued.
//!
//! Only the whiteboard channel is throttled. Chat, code, and membership
//! broadcasts go out immediately.
//!
//! Rooms throttle independently: each scheduled flush is its own task, so
//! a burst in one room cannot delay delivery in another.

use tracing::debug;

use crate::protocol::ServerEvent;
use crate::services::room;
use crate::services::whiteboard::WhiteboardDelta;
use crate::state::AppState;

/// Queue a delta for the room's next throttled broadcast, scheduling a
/// flush if none is pending. No-op for an absent room.
pub async fn enqueue(state: &AppState, room_id: &str, delta: WhiteboardDelta) {
    let schedule_flush = {
        let mut rooms = state.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        if room.pending_delta.is_some() {
            debug!(%room_id, "superseding pending whiteboard delta");
        }
        room.pending_delta = Some(delta);
        if room.flush_scheduled {
            false
        } else {
            room.flush_scheduled = true;
            true
        }
    };

    if schedule_flush {
        let state = state.clone();
        let room_id = room_id.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(state.throttle_interval).await;
            flush(&state, &room_id).await;
        });
    }
}

/// Broadcast the room's latest pending delta, if any. Clears the timer
/// flag first so a delta arriving mid-flush schedules a fresh interval.
async fn flush(state: &AppState, room_id: &str) {
    let pending = {
        let mut rooms = state.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            // Room evicted while the timer was running.
            return;
        };
        room.flush_scheduled = false;
        room.pending_delta.take()
    };

    if let Some(delta) = pending {
        room::broadcast(state, room_id, &ServerEvent::WhiteboardUpdate { data: delta }).await;
    }
}

#[cfg(test)]
#[path = "throttle_test.rs"]
mod tests;
