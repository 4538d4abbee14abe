use crate::hub::{Connection, Hub};
use crate::registry::ConnectionHandle;
use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Drives a single WebSocket connection against the hub.
///
/// Inbound frames and the final disconnect are handled sequentially by this
/// task, so a connection's updates can never land after its own removal.
pub struct Session {
    hub: Arc<Hub>,
    state: SessionState,
}

impl Session {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle WebSocket connection lifecycle
    pub async fn run(mut self, mut socket: WebSocket) {
        let _guard = self.hub.track_session();
        let mut shutdown_rx = self.hub.subscribe_shutdown();

        let Connection {
            handle,
            connection_id,
            mut outbox,
        } = match self.hub.connect() {
            Ok(connection) => connection,
            Err(e) => {
                warn!(error = %e, "Rejecting connection");
                let _ = socket.send(Message::Close(None)).await;
                self.state = SessionState::Closed;
                return;
            }
        };
        self.state = SessionState::Open;
        debug!(handle = %handle, connection_id = %connection_id, "Session open");

        loop {
            tokio::select! {
                // Handle incoming client messages
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.on_text(handle, &text),
                        Some(Ok(Message::Close(_))) | None => {
                            info!(handle = %handle, "WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(handle = %handle, error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(_)) => {
                            // Ignore binary, pong messages
                        }
                        Some(Err(e)) => {
                            warn!(handle = %handle, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Forward queued frames
                Some(frame) = outbox.recv() => {
                    if let Err(e) = socket.send(Message::Text(frame.to_string())).await {
                        warn!(handle = %handle, error = %e, "Failed to send frame");
                        break;
                    }
                }

                // Host shutdown
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(handle = %handle, "Closing session for shutdown");
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }

        self.state = SessionState::Closing;
        self.hub.disconnect(handle);
        self.state = SessionState::Closed;
        debug!(handle = %handle, "Session closed");
    }

    /// Only reachable while Open; once the session leaves the loop its handle
    /// is unregistered and the hub ignores further frames for it.
    fn on_text(&self, handle: ConnectionHandle, text: &str) {
        if let Err(e) = self.hub.handle_text(handle, text) {
            debug!(handle = %handle, error = %e, "Inbound frame rejected");
        }
    }
}
