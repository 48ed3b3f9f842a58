//! Wire protocol: every message on the realtime channel.
//!
//! DESIGN
//! ======
//! One WebSocket endpoint carries JSON text frames in both directions.
//! Inbound frames deserialize into `ClientEvent`, outbound frames serialize
//! from `ServerEvent`; both are internally tagged on `event` with camelCase
//! payload fields, so a frame looks like
//! `{"event":"join-room","roomId":"r1","username":"alice"}`.
//!
//! Handlers never touch raw JSON; decoding happens once at the socket
//! boundary and a frame that does not parse is dropped there.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::whiteboard::{WhiteboardDelta, WhiteboardDoc};

// =============================================================================
// CHAT
// =============================================================================

/// One chat message. Immutable once appended to a room; `id` is generated
/// client-side and doubles as the de-duplication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user: String,
    pub text: String,
    /// Display-formatted timestamp, passed through untouched.
    pub time: String,
}

// =============================================================================
// PRESENCE
// =============================================================================

/// Membership list entry as broadcast in `room-users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUser {
    pub id: Uuid,
    pub username: String,
}

// =============================================================================
// CLIENT → SERVER
// =============================================================================

/// Inbound events. Each carries the target room id; events referencing a
/// room that does not exist are no-ops except `join-room`, which creates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom { room_id: String, username: String },
    LeaveRoom { room_id: String, username: String },
    GetUsers { room_id: String },
    GetRoomState { room_id: String },
    SendMessage { room_id: String, msg: ChatMessage },
    CodeUpdate { room_id: String, code: String },
    WhiteboardUpdate { room_id: String, data: WhiteboardDelta },
}

impl ClientEvent {
    /// Target room id for any inbound event.
    #[must_use]
    pub fn room_id(&self) -> &str {
        match self {
            Self::JoinRoom { room_id, .. }
            | Self::LeaveRoom { room_id, .. }
            | Self::GetUsers { room_id }
            | Self::GetRoomState { room_id }
            | Self::SendMessage { room_id, .. }
            | Self::CodeUpdate { room_id, .. }
            | Self::WhiteboardUpdate { room_id, .. } => room_id,
        }
    }
}

// =============================================================================
// SERVER → CLIENT
// =============================================================================

/// Outbound events. `RoomState` goes to a single connection (join/query);
/// the rest are room broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    RoomState {
        messages: Vec<ChatMessage>,
        code: String,
        whiteboard: WhiteboardDoc,
    },
    RoomUsers {
        users: Vec<RoomUser>,
    },
    UserJoined {
        username: String,
    },
    UserLeft {
        username: String,
    },
    ReceiveMessage {
        msg: ChatMessage,
    },
    CodeUpdate {
        code: String,
    },
    WhiteboardUpdate {
        data: WhiteboardDelta,
    },
}

// =============================================================================
// DECODING
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid event frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("empty room id")]
    EmptyRoomId,
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns `Decode` for JSON that is not a known event shape and
/// `EmptyRoomId` for events addressing the empty-string room. Callers log
/// and drop; decode failures are never surfaced to other participants.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, ProtocolError> {
    let event: ClientEvent = serde_json::from_str(text)?;
    if event.room_id().is_empty() {
        return Err(ProtocolError::EmptyRoomId);
    }
    Ok(event)
}

// =============================================================================
// TESTS
// =============================================================================
