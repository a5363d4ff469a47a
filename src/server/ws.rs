//! WebSocket fan-out of page-level events.
//!
//! Best-effort delivery: each subscriber gets its own broadcast receiver;
//! send failures drop the socket, and lagging subscribers lose messages
//! rather than slowing the action path.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::ServeState;
use crate::events::ControlEvent;

pub async fn websocket_handler(
    State(state): State<ServeState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let events = state.manager.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, events))
}

async fn handle_socket(mut socket: WebSocket, mut events: broadcast::Receiver<ControlEvent>) {
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(err) => {
                                warn!(target: "simplepage", %err, "event serialization failed");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            debug!(target: "simplepage", "subscriber dropped");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "simplepage", skipped, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(target: "simplepage", ?frame, "subscriber closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(target: "simplepage", %err, "websocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}
