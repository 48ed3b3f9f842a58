//! Realtime collaboration room server: shared whiteboard, shared code
//! editor, and chat, synchronized over WebSocket.
//!
//! Room state is authoritative and in-memory only. The server is the
//! single sequencer; a restart loses room contents and clients recover
//! by rejoining.

pub mod protocol;
pub mod routes;
pub mod services;
pub mod state;
