//! Connection registry and event fan-out.
//!
//! The hub owns all mutable broker state: the set of admitted connections
//! and the [`RoomRegistry`]. It runs as a single task fed by one command
//! channel, so every registration, membership change, disconnect and
//! dispatch is applied to completion before the next one starts. No lock
//! guards the state.
//!
//! # Architecture
//!
//! - [`Hub`] - The state machine: registry plus dispatch decisions
//! - [`HubHandle`] - Cloneable handle that sends commands to the hub task
//!
//! Each admitted connection hands the hub the sending half of a bounded
//! outbound queue. Dispatch serializes a frame once and pushes it onto every
//! recipient queue without waiting: a full or closed queue just misses the
//! frame. Because a connection's commands travel one ordered channel to one
//! consumer, two events from the same source reach every common recipient in
//! publish order.
//!
//! # Example
//!
//! ```rust
//! use socket_broker::auth::Admission;
//! use socket_broker::hub::{DispatchTarget, Hub};
//! use socket_broker::types::{ConnectionId, ServerFrame, EVENT_CUSTOM};
//! use serde_json::json;
//! use tokio::sync::mpsc;
//!
//! let mut hub = Hub::new();
//! let id = ConnectionId::new();
//! let (tx, mut rx) = mpsc::channel(8);
//! hub.register(id, Admission::Anonymous, tx);
//!
//! let delivered = hub.dispatch(&DispatchTarget::All, &ServerFrame::new(EVENT_CUSTOM, json!({ "x": 1 })));
//! assert_eq!(delivered, 1);
//! assert!(rx.try_recv().is_ok());
//! ```

use std::collections::HashMap;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::auth::Admission;
use crate::error::{Result, ServerError};
use crate::rooms::RoomRegistry;
use crate::types::{ConnectionId, ServerFrame};

/// Capacity of each connection's outbound queue.
///
/// A recipient that falls this far behind starts missing frames.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1000;

/// Serialized frame ready to be written to a socket.
pub type Outbound = Utf8Bytes;

/// Sending half of a connection's outbound queue.
pub type OutboundSender = mpsc::Sender<Outbound>;

/// Which connections receive a dispatched frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// Every admitted connection, the sender included.
    All,

    /// Every member of the named room.
    Room(String),
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Admitted connections.
    pub connections: usize,

    /// Admitted connections that presented a valid token.
    pub authenticated: usize,

    /// Non-empty rooms, identity rooms included.
    pub rooms: usize,
}

#[derive(Debug)]
struct ConnectionEntry {
    outbound: OutboundSender,
    admission: Admission,
}

/// Broker state: admitted connections and their room memberships.
#[derive(Debug, Default)]
pub struct Hub {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: RoomRegistry,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a connection and joins it to its identity room.
    pub fn register(&mut self, id: ConnectionId, admission: Admission, outbound: OutboundSender) {
        self.connections
            .insert(id, ConnectionEntry { outbound, admission });
        self.rooms.join(id, &id.room_name());
        debug!(
            connection = %id,
            authenticated = admission.is_authenticated(),
            connections = self.connections.len(),
            "Connection registered"
        );
    }

    /// Adds a connection to a room. Unknown connections are ignored.
    pub fn join(&mut self, id: ConnectionId, room: &str) -> bool {
        if !self.connections.contains_key(&id) {
            trace!(connection = %id, room, "Join from unregistered connection ignored");
            return false;
        }
        self.rooms.join(id, room)
    }

    /// Removes a connection from a room. Non-members are ignored.
    pub fn leave(&mut self, id: ConnectionId, room: &str) -> bool {
        self.rooms.leave(id, room)
    }

    /// Forgets a connection and every membership it held.
    ///
    /// Dropping the stored queue sender lets the connection's writer drain
    /// and stop. Returns `false` if the connection was not registered.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let rooms = self.rooms.remove_connection(id);
        let removed = self.connections.remove(&id).is_some();
        if removed {
            debug!(
                connection = %id,
                rooms_left = rooms.len(),
                connections = self.connections.len(),
                "Connection unregistered"
            );
        }
        removed
    }

    /// Delivers `frame` to every connection in `target`.
    ///
    /// Returns how many recipient queues accepted the frame. Never waits.
    pub fn dispatch(&self, target: &DispatchTarget, frame: &ServerFrame) -> usize {
        let text: Outbound = match serde_json::to_string(frame) {
            Ok(json) => json.into(),
            Err(err) => {
                error!(error = %err, event = %frame.event, "Failed to serialize frame");
                return 0;
            }
        };

        let delivered = match target {
            DispatchTarget::All => self
                .connections
                .iter()
                .filter(|(id, entry)| Self::offer(**id, &entry.outbound, &text))
                .count(),
            DispatchTarget::Room(room) => self
                .rooms
                .members(room)
                .filter(|id| {
                    self.connections
                        .get(id)
                        .is_some_and(|entry| Self::offer(*id, &entry.outbound, &text))
                })
                .count(),
        };

        trace!(event = %frame.event, dispatch_target = ?target, delivered, "Frame dispatched");
        delivered
    }

    fn offer(id: ConnectionId, outbound: &OutboundSender, text: &Outbound) -> bool {
        match outbound.try_send(text.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %id, "Outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!(connection = %id, "Outbound queue closed, skipping");
                false
            }
        }
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            connections: self.connections.len(),
            authenticated: self
                .connections
                .values()
                .filter(|entry| entry.admission.is_authenticated())
                .count(),
            rooms: self.rooms.room_count(),
        }
    }
}

enum Command {
    Register {
        id: ConnectionId,
        admission: Admission,
        outbound: OutboundSender,
    },
    Join {
        id: ConnectionId,
        room: String,
    },
    Leave {
        id: ConnectionId,
        room: String,
    },
    Emit {
        source: ConnectionId,
        target: DispatchTarget,
        frame: ServerFrame,
    },
    Disconnect {
        id: ConnectionId,
    },
    Snapshot {
        reply: oneshot::Sender<HubSnapshot>,
    },
    RoomMembers {
        room: String,
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
    RoomsOf {
        id: ConnectionId,
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Cloneable handle to the hub task.
///
/// The hub task stops once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Register { .. } => "Register",
            Self::Join { .. } => "Join",
            Self::Leave { .. } => "Leave",
            Self::Emit { .. } => "Emit",
            Self::Disconnect { .. } => "Disconnect",
            Self::Snapshot { .. } => "Snapshot",
            Self::RoomMembers { .. } => "RoomMembers",
            Self::RoomsOf { .. } => "RoomsOf",
        };
        f.write_str(name)
    }
}

impl HubHandle {
    /// Spawns the hub task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn() -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(Hub::new(), receiver));
        Self { commands }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ServerError::internal("hub task stopped"))
    }

    /// Admits a connection. Frames for it are pushed onto `outbound`.
    pub fn register(
        &self,
        id: ConnectionId,
        admission: Admission,
        outbound: OutboundSender,
    ) -> Result<()> {
        self.send(Command::Register {
            id,
            admission,
            outbound,
        })
    }

    pub fn join(&self, id: ConnectionId, room: impl Into<String>) -> Result<()> {
        self.send(Command::Join {
            id,
            room: room.into(),
        })
    }

    pub fn leave(&self, id: ConnectionId, room: impl Into<String>) -> Result<()> {
        self.send(Command::Leave {
            id,
            room: room.into(),
        })
    }

    /// Queues `frame` for fan-out on behalf of `source`.
    ///
    /// Frames from a source that is not (or no longer) registered are dropped.
    pub fn emit(&self, source: ConnectionId, target: DispatchTarget, frame: ServerFrame) -> Result<()> {
        self.send(Command::Emit {
            source,
            target,
            frame,
        })
    }

    /// Unregisters a connection and clears its memberships.
    pub fn disconnect(&self, id: ConnectionId) -> Result<()> {
        self.send(Command::Disconnect { id })
    }

    /// Returns counters reflecting every command sent before this call.
    pub async fn snapshot(&self) -> Result<HubSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await
            .map_err(|_| ServerError::internal("hub task stopped"))
    }

    /// Returns the current members of `room`.
    pub async fn room_members(&self, room: impl Into<String>) -> Result<Vec<ConnectionId>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RoomMembers {
            room: room.into(),
            reply,
        })?;
        rx.await
            .map_err(|_| ServerError::internal("hub task stopped"))
    }

    /// Returns the rooms `id` currently belongs to.
    pub async fn rooms_of(&self, id: ConnectionId) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RoomsOf { id, reply })?;
        rx.await
            .map_err(|_| ServerError::internal("hub task stopped"))
    }
}

async fn run(mut hub: Hub, mut commands: mpsc::UnboundedReceiver<Command>) {
    debug!("Hub task started");

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register {
                id,
                admission,
                outbound,
            } => hub.register(id, admission, outbound),
            Command::Join { id, room } => {
                hub.join(id, &room);
            }
            Command::Leave { id, room } => {
                hub.leave(id, &room);
            }
            Command::Emit {
                source,
                target,
                frame,
            } => {
                if hub.is_connected(source) {
                    hub.dispatch(&target, &frame);
                } else {
                    trace!(connection = %source, "Emit from unregistered connection dropped");
                }
            }
            Command::Disconnect { id } => {
                hub.disconnect(id);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(hub.snapshot());
            }
            Command::RoomMembers { room, reply } => {
                let _ = reply.send(hub.rooms().members(&room).collect());
            }
            Command::RoomsOf { id, reply } => {
                let _ = reply.send(hub.rooms().rooms_of(id).map(String::from).collect());
            }
        }
    }

    info!(
        connections = hub.connection_count(),
        "Hub task stopped"
    );
}
