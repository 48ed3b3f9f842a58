//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the room registry: a map of live room states, each with its
//! own chat history, code buffer, whiteboard document, connected clients,
//! and throttle bookkeeping for whiteboard fan-out.
//!
//! Room state lives in process memory only. A room is created lazily on
//! first join and evicted when its last participant leaves; eviction is
//! the sole garbage-collection path, so nothing else may remove entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::protocol::{ChatMessage, ServerEvent};
use crate::services::whiteboard::{WhiteboardDelta, WhiteboardDoc};

/// Default interval between whiteboard broadcast flushes, in milliseconds.
const DEFAULT_THROTTLE_MS: u64 = 50;

// =============================================================================
// PARTICIPANT
// =============================================================================

/// One joined connection. Insertion order in `RoomState::users` is the
/// membership display order.
#[derive(Debug, Clone)]
pub struct Participant {
    pub conn_id: Uuid,
    pub username: String,
}

// =============================================================================
// ROOM STATE
// =============================================================================

/// Per-room live state. Exclusively mutated through the room/presence
/// services; handlers never touch the maps directly.
pub struct RoomState {
    /// Chat history in append order.
    pub messages: Vec<ChatMessage>,
    /// Current code buffer. Whole-document replacement, no OT.
    pub code: String,
    pub whiteboard: WhiteboardDoc,
    /// Connected clients: connection id -> sender for outgoing events.
    pub clients: HashMap<Uuid, mpsc::Sender<ServerEvent>>,
    /// Membership in join order.
    pub users: Vec<Participant>,
    /// Latest whiteboard delta waiting for the next throttled flush.
    pub pending_delta: Option<WhiteboardDelta>,
    /// Whether a flush timer is already running for this room.
    pub flush_scheduled: bool,
}

impl RoomState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            code: String::new(),
            whiteboard: WhiteboardDoc::default(),
            clients: HashMap::new(),
            users: Vec::new(),
            pending_delta: None,
            flush_scheduled: false,
        }
    }
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<String, RoomState>>>,
    /// Whiteboard fan-out coalescing interval.
    pub throttle_interval: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(throttle_interval: Duration) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), throttle_interval }
    }

    /// State configured from `WHITEBOARD_THROTTLE_MS` (default 50).
    #[must_use]
    pub fn from_env() -> Self {
        let throttle_ms = env_parse("WHITEBOARD_THROTTLE_MS", DEFAULT_THROTTLE_MS);
        Self::new(Duration::from_millis(throttle_ms))
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_state_new_is_empty() {
        let room = RoomState::new();
        assert!(room.messages.is_empty());
        assert!(room.code.is_empty());
        assert!(room.whiteboard.objects.is_empty());
        assert!(room.clients.is_empty());
        assert!(room.users.is_empty());
        assert!(room.pending_delta.is_none());
        assert!(!room.flush_scheduled);
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        // SAFETY: test-only key nothing else reads concurrently.
        unsafe { std::env::set_var("COLLABROOM_TEST_THROTTLE", "not-a-number") };
        assert_eq!(env_parse("COLLABROOM_TEST_THROTTLE", 50_u64), 50);
        unsafe { std::env::remove_var("COLLABROOM_TEST_THROTTLE") };
    }
}
