//! WebSocket connection to a state-sync hub.
//!
//! Two background tasks own the socket halves: the writer drains an outbound
//! queue filled by [`Transport::send`], the reader decodes server messages and
//! dispatches them to registered listeners by tag. The reader starts before
//! any command is set up; [`Listeners`] keeps the latest snapshot for them.

use crate::transport::{CommandError, Listener, Listeners, Transport};
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use statesync::protocol::decode_server_message;
use statesync::{ClientMessage, ServerMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Live hub connection
pub struct HubConnection {
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    listeners: Arc<Listeners>,
    connected: Arc<AtomicBool>,
    connection_id: Arc<Mutex<Option<String>>>,
}

impl HubConnection {
    /// Open the WebSocket and start the reader/writer tasks
    pub async fn connect(url: &str) -> Result<Arc<Self>> {
        let (stream, _response) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        info!(url = %url, "Connected to state-sync hub");

        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ClientMessage>();

        let listeners = Arc::new(Listeners::default());
        let connected = Arc::new(AtomicBool::new(true));
        let connection_id = Arc::new(Mutex::new(None));

        let writer_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize client message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "Send to hub failed");
                    break;
                }
            }
            writer_connected.store(false, Ordering::SeqCst);
            let _ = sink.close().await;
            debug!("Hub writer stopped");
        });

        let reader_listeners = Arc::clone(&listeners);
        let reader_connected = Arc::clone(&connected);
        let reader_connection_id = Arc::clone(&connection_id);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match decode_server_message(&text) {
                        Ok(msg) => {
                            match &msg {
                                ServerMessage::Welcome { connection_id, .. } => {
                                    *reader_connection_id
                                        .lock()
                                        .unwrap_or_else(PoisonError::into_inner) =
                                        Some(connection_id.clone());
                                }
                                ServerMessage::Error { error } => {
                                    warn!(error = %error, "Hub rejected a message");
                                }
                                _ => {}
                            }
                            reader_listeners.dispatch(&msg);
                        }
                        Err(e) => warn!(error = %e, "Ignoring undecodable server message"),
                    },
                    Ok(Message::Close(_)) => {
                        info!("Hub closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Hub connection error");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            debug!("Hub reader stopped");
        });

        Ok(Arc::new(Self {
            outbound: Mutex::new(Some(tx)),
            listeners,
            connected,
            connection_id,
        }))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connection id assigned by the hub's welcome message
    pub fn connection_id(&self) -> Option<String> {
        self.connection_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop sending. Queued messages are flushed, then the socket is closed.
    pub fn close(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Transport for HubConnection {
    fn send(&self, msg: ClientMessage) -> Result<(), CommandError> {
        if !self.is_connected() {
            return Err(CommandError::ConnectionUnavailable);
        }
        match self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(tx) => tx
                .send(msg)
                .map_err(|_| CommandError::ConnectionUnavailable),
            None => Err(CommandError::ConnectionUnavailable),
        }
    }

    fn register_listener(
        &self,
        tags: &'static [&'static str],
        listener: Listener,
    ) -> Result<(), CommandError> {
        self.listeners.register(tags, listener);
        Ok(())
    }
}
