//! Domain services behind the websocket event router.
//!
//! ARCHITECTURE
//! ============
//! Service modules own room state and business logic so the router can
//! stay focused on protocol translation and fan-out targeting. All room
//! state flows through `room` and `presence`; nothing else touches the
//! registry maps.

pub mod presence;
pub mod room;
pub mod throttle;
pub mod whiteboard;
