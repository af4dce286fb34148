use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::ProtocolError;
use crate::models::{ClientMessage, ServerMessage, SessionId};
use crate::AppState;

use super::hub::HubHandle;

/// Disconnects the session from the hub when the connection task ends,
/// whichever way it ends.
struct DeferDisconnect {
    hub: HubHandle,
    session: SessionId,
}

impl Drop for DeferDisconnect {
    fn drop(&mut self) {
        self.hub.disconnect(&self.session);
    }
}

/// WebSocket handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    debug!("New WebSocket connection attempt");
    let capacity = state.config.outbox_capacity.max(1);
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, capacity))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, hub: HubHandle, outbox_capacity: usize) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut inbox) = mpsc::channel::<ServerMessage>(outbox_capacity);

    let session_id = match hub.connect(outbox).await {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to register WebSocket session: {}", e);
            return;
        }
    };
    let _disconnect = DeferDisconnect {
        hub: hub.clone(),
        session: session_id.clone(),
    };
    info!(session = %session_id, "WebSocket connection established");

    // Drain the outbox into the socket. Ends when the hub drops the session
    // or the socket stops accepting writes.
    let writer_session = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!(session = %writer_session, "Failed to encode {} message: {}", msg.kind(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                debug!(session = %writer_session, "socket write failed; writer exiting");
                break;
            }
        }
    });

    // Forward parsed client messages to the hub
    let reader_session = session_id.clone();
    let reader_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match ClientMessage::parse(&text) {
                    Ok(msg) => {
                        debug!(session = %reader_session, kind = msg.kind(), "message received");
                        if reader_hub.submit(&reader_session, msg).is_err() {
                            error!(session = %reader_session, "hub stopped; closing connection");
                            break;
                        }
                    }
                    Err(e) => warn!(session = %reader_session, error = %e, "dropping message"),
                },
                Ok(Message::Binary(_)) => {
                    let e = ProtocolError::UnexpectedFrame("binary");
                    warn!(session = %reader_session, error = %e, "dropping message");
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(session = %reader_session, "socket read failed: {}", e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!(session = %session_id, "WebSocket connection terminated");
}
