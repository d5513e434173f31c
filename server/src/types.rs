//! Wire types shared by the connection handler and the hub.
//!
//! Every WebSocket text message is a JSON frame with an event name and an
//! optional opaque payload:
//!
//! ```json
//! { "event": "custom:event", "data": { "x": 1 } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Client request to join a room. Payload: room name.
pub const EVENT_JOIN: &str = "join";

/// Client request to leave a room. Payload: room name.
pub const EVENT_LEAVE: &str = "leave";

/// Event relayed to every connection, sender included.
pub const EVENT_CUSTOM: &str = "custom:event";

/// Event relayed to the members of one room. Payload: [`RoomMessage`].
pub const EVENT_ROOM: &str = "room:event";

/// Sent once to a newly admitted connection. Payload: `{ "id": <id> }`.
pub const EVENT_CONNECT: &str = "connect";

/// Opaque identifier of a live connection.
///
/// Assigned at accept time and never reused while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Name of the connection's implicit identity room.
    pub fn room_name(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Frame received from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientFrame {
    /// Event name used to look up the handler.
    pub event: String,

    /// Opaque payload. Missing payloads decode as `null`.
    #[serde(default)]
    pub data: Value,
}

/// Frame sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    pub event: String,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Payload of a room-scoped event, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessage {
    pub room: String,

    #[serde(default)]
    pub payload: Value,
}
