//! Client event handlers.
//!
//! Incoming frames are routed by event name through a lookup table built
//! once at startup. Names without a handler fall through to a no-op.
//!
//! | Event | Payload | Effect |
//! |-------|---------|--------|
//! | `join` | room name | Adds the connection to the room |
//! | `leave` | room name | Removes the connection from the room |
//! | `custom:event` | any | Relays the payload to every connection, sender included |
//! | `room:event` | `{ "room", "payload" }` | Relays to the members of `room` |

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::hub::{DispatchTarget, HubHandle};
use crate::types::{
    ClientFrame, ConnectionId, RoomMessage, ServerFrame, EVENT_CUSTOM, EVENT_JOIN, EVENT_LEAVE,
    EVENT_ROOM,
};

/// What a handler sees about the connection that sent the frame.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub hub: HubHandle,
}

/// A handler reacting to one event name.
pub type EventHandler = fn(&ConnectionContext, Value);

/// Event-name lookup table.
#[derive(Clone)]
pub struct EventHandlers {
    table: HashMap<&'static str, EventHandler>,
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.table.keys()).finish()
    }
}

impl EventHandlers {
    /// An empty table; every event is ignored.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// The broker's handler set.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(EVENT_JOIN, on_join)
            .with(EVENT_LEAVE, on_leave)
            .with(EVENT_CUSTOM, on_custom_event)
            .with(EVENT_ROOM, on_room_event)
    }

    /// Registers `handler` for `event`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, event: &'static str, handler: EventHandler) -> Self {
        self.table.insert(event, handler);
        self
    }

    pub fn contains(&self, event: &str) -> bool {
        self.table.contains_key(event)
    }

    /// Runs the handler for `frame.event`.
    ///
    /// Returns `false` if no handler is registered for the name.
    pub fn handle(&self, ctx: &ConnectionContext, frame: ClientFrame) -> bool {
        match self.table.get(frame.event.as_str()) {
            Some(handler) => {
                handler(ctx, frame.data);
                true
            }
            None => {
                trace!(connection = %ctx.id, event = %frame.event, "No handler for event");
                false
            }
        }
    }
}

impl Default for EventHandlers {
    fn default() -> Self {
        Self::standard()
    }
}

fn room_name(data: &Value) -> Option<&str> {
    data.as_str()
}

fn on_join(ctx: &ConnectionContext, data: Value) {
    let Some(room) = room_name(&data) else {
        debug!(connection = %ctx.id, "join ignored: room name must be a string");
        return;
    };
    if let Err(err) = ctx.hub.join(ctx.id, room) {
        warn!(connection = %ctx.id, error = %err, "Failed to join room");
    }
}

fn on_leave(ctx: &ConnectionContext, data: Value) {
    let Some(room) = room_name(&data) else {
        debug!(connection = %ctx.id, "leave ignored: room name must be a string");
        return;
    };
    if let Err(err) = ctx.hub.leave(ctx.id, room) {
        warn!(connection = %ctx.id, error = %err, "Failed to leave room");
    }
}

fn on_custom_event(ctx: &ConnectionContext, data: Value) {
    debug!(connection = %ctx.id, "custom:event received");
    trace!(connection = %ctx.id, payload = %data, "custom:event payload");

    let frame = ServerFrame::new(EVENT_CUSTOM, data);
    if let Err(err) = ctx.hub.emit(ctx.id, DispatchTarget::All, frame) {
        warn!(connection = %ctx.id, error = %err, "Failed to relay custom:event");
    }
}

fn on_room_event(ctx: &ConnectionContext, data: Value) {
    let message: RoomMessage = match serde_json::from_value(data) {
        Ok(message) => message,
        Err(err) => {
            debug!(connection = %ctx.id, error = %err, "room:event ignored: malformed envelope");
            return;
        }
    };

    let target = DispatchTarget::Room(message.room.clone());
    let data = match serde_json::to_value(&message) {
        Ok(data) => data,
        Err(err) => {
            warn!(connection = %ctx.id, error = %err, "Failed to encode room:event");
            return;
        }
    };

    if let Err(err) = ctx.hub.emit(ctx.id, target, ServerFrame::new(EVENT_ROOM, data)) {
        warn!(connection = %ctx.id, error = %err, "Failed to relay room:event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Admission;
    use crate::hub::Outbound;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn frame(event: &str, data: Value) -> ClientFrame {
        ClientFrame {
            event: event.to_string(),
            data,
        }
    }

    async fn registered(hub: &HubHandle) -> (ConnectionContext, mpsc::Receiver<Outbound>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(16);
        hub.register(id, Admission::Anonymous, tx).unwrap();
        (
            ConnectionContext {
                id,
                hub: hub.clone(),
            },
            rx,
        )
    }

    fn next_frame(rx: &mut mpsc::Receiver<Outbound>) -> ServerFrame {
        let text = rx.try_recv().expect("frame should be queued");
        serde_json::from_str(text.as_str()).unwrap()
    }

    #[test]
    fn standard_table_has_all_client_events() {
        let handlers = EventHandlers::standard();
        for event in [EVENT_JOIN, EVENT_LEAVE, EVENT_CUSTOM, EVENT_ROOM] {
            assert!(handlers.contains(event), "missing handler for {event}");
        }
        assert!(!handlers.contains("connect"));
    }

    #[tokio::test]
    async fn unknown_event_is_noop() {
        let hub = HubHandle::spawn();
        let (ctx, mut rx) = registered(&hub).await;

        assert!(!EventHandlers::standard().handle(&ctx, frame("no-such-event", json!(1))));
        hub.snapshot().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_and_leave_update_membership() {
        let hub = HubHandle::spawn();
        let (ctx, _rx) = registered(&hub).await;
        let handlers = EventHandlers::standard();

        handlers.handle(&ctx, frame(EVENT_JOIN, json!("lobby")));
        assert_eq!(hub.room_members("lobby").await.unwrap(), vec![ctx.id]);

        handlers.handle(&ctx, frame(EVENT_LEAVE, json!("lobby")));
        assert!(hub.room_members("lobby").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_with_non_string_payload_is_ignored() {
        let hub = HubHandle::spawn();
        let (ctx, _rx) = registered(&hub).await;

        EventHandlers::standard().handle(&ctx, frame(EVENT_JOIN, json!({ "room": "lobby" })));
        let rooms = hub.rooms_of(ctx.id).await.unwrap();
        assert_eq!(rooms, vec![ctx.id.room_name()]);
    }

    #[tokio::test]
    async fn custom_event_echoes_to_sender_and_others() {
        let hub = HubHandle::spawn();
        let (sender, mut rx_sender) = registered(&hub).await;
        let (_other, mut rx_other) = registered(&hub).await;

        EventHandlers::standard().handle(&sender, frame(EVENT_CUSTOM, json!({ "x": 1 })));
        hub.snapshot().await.unwrap();

        for rx in [&mut rx_sender, &mut rx_other] {
            let received = next_frame(rx);
            assert_eq!(received.event, EVENT_CUSTOM);
            assert_eq!(received.data, json!({ "x": 1 }));
        }
    }

    #[tokio::test]
    async fn room_event_reaches_members_only() {
        let hub = HubHandle::spawn();
        let handlers = EventHandlers::standard();
        let (member, mut rx_member) = registered(&hub).await;
        let (outsider, mut rx_outsider) = registered(&hub).await;

        handlers.handle(&member, frame(EVENT_JOIN, json!("ops")));
        handlers.handle(
            &outsider,
            frame(EVENT_ROOM, json!({ "room": "ops", "payload": [1, 2] })),
        );
        hub.snapshot().await.unwrap();

        let received = next_frame(&mut rx_member);
        assert_eq!(received.event, EVENT_ROOM);
        assert_eq!(received.data, json!({ "room": "ops", "payload": [1, 2] }));
        assert!(rx_outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_room_event_is_ignored() {
        let hub = HubHandle::spawn();
        let (ctx, mut rx) = registered(&hub).await;

        EventHandlers::standard().handle(&ctx, frame(EVENT_ROOM, json!("not-an-envelope")));
        hub.snapshot().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn custom_table_entries_are_used() {
        fn shout(ctx: &ConnectionContext, data: Value) {
            ctx.hub
                .emit(ctx.id, DispatchTarget::All, ServerFrame::new("shout", data))
                .unwrap();
        }

        let hub = HubHandle::spawn();
        let (ctx, mut rx) = registered(&hub).await;
        let handlers = EventHandlers::empty().with("shout", shout);

        assert!(handlers.handle(&ctx, frame("shout", json!("hey"))));
        assert!(!handlers.handle(&ctx, frame(EVENT_CUSTOM, json!("ignored"))));
        hub.snapshot().await.unwrap();

        assert_eq!(next_frame(&mut rx).event, "shout");
        assert!(rx.try_recv().is_err());
    }
}
