//! Lifetime of one admitted WebSocket connection.
//!
//! A connection runs two halves:
//!
//! - a writer task draining the connection's outbound queue to the socket
//! - a reader loop decoding client frames and routing them through
//!   [`EventHandlers`]
//!
//! Whichever half finishes first ends the connection. Hub cleanup runs
//! exactly once, from a drop guard, so it also happens when the task is
//! cancelled mid-flight.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::auth::Admission;
use crate::events::{ConnectionContext, EventHandlers};
use crate::hub::{HubHandle, Outbound, DEFAULT_OUTBOUND_CAPACITY};
use crate::types::{ClientFrame, ConnectionId, ServerFrame, EVENT_CONNECT};

/// Unregisters the connection from the hub when dropped.
struct DisconnectGuard {
    hub: HubHandle,
    id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if let Err(err) = self.hub.disconnect(self.id) {
            debug!(connection = %self.id, error = %err, "Hub gone before disconnect");
        }
    }
}

fn connect_frame(id: ConnectionId) -> Option<Outbound> {
    let frame = ServerFrame::new(EVENT_CONNECT, json!({ "id": id }));
    serde_json::to_string(&frame).ok().map(Outbound::from)
}

/// Serves an upgraded socket until either side closes it.
pub async fn run_connection(
    socket: WebSocket,
    hub: HubHandle,
    handlers: Arc<EventHandlers>,
    admission: Admission,
) {
    let id = ConnectionId::new();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(DEFAULT_OUTBOUND_CAPACITY);

    // Queued before registration so it is the first frame the client sees.
    if let Some(frame) = connect_frame(id) {
        let _ = outbound_tx.try_send(frame);
    }

    if let Err(err) = hub.register(id, admission, outbound_tx) {
        warn!(connection = %id, error = %err, "Failed to register connection");
        return;
    }
    let _guard = DisconnectGuard {
        hub: hub.clone(),
        id,
    };

    info!(
        connection = %id,
        authenticated = admission.is_authenticated(),
        "Client connected"
    );

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(err) = sink.send(Message::Text(text)).await {
                debug!(error = %err, "Failed to write frame");
                return "write failed";
            }
        }
        let _ = sink.close().await;
        "server closed"
    });

    let ctx = ConnectionContext {
        id,
        hub: hub.clone(),
    };

    let reader = async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(frame) => {
                        handlers.handle(&ctx, frame);
                    }
                    Err(err) => {
                        debug!(connection = %id, error = %err, "Ignoring malformed frame");
                    }
                },
                Ok(Message::Binary(data)) => {
                    trace!(connection = %id, len = data.len(), "Ignoring binary frame");
                }
                Ok(Message::Close(_)) => return "client closed",
                Ok(_) => {
                    // axum answers pings itself
                }
                Err(err) => {
                    debug!(connection = %id, error = %err, "WebSocket error");
                    return "transport error";
                }
            }
        }
        "transport closed"
    };

    let reason = tokio::select! {
        reason = reader => reason,
        result = &mut writer => result.unwrap_or("writer aborted"),
    };
    writer.abort();

    info!(connection = %id, reason, "Client disconnected");
}
