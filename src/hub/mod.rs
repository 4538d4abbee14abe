// Hub: server-side endpoint terminating every client connection

mod metrics;
mod session;

pub use metrics::{HubMetrics, MetricsSnapshot};
pub use session::{Session, SessionState};

use crate::config::HubSettings;
use crate::identity::NetworkIdentity;
use crate::protocol::{
    decode_client_message, ClientMessage, ClientPackage, Frame, PayloadError, Position,
    ServerMessage,
};
use crate::registry::{
    BroadcastReport, ClientRecordStore, ConnectionDirectory, ConnectionHandle, ConnectionInfo,
    DirectoryError, StoreError, UpdateOutcome,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;


/// Transport-level client identifier handed out by the hub
pub type ConnectionId = String;

/// Hub errors
#[derive(Debug, Clone, PartialEq)]
pub enum HubError {
    Payload(PayloadError),
    Directory(DirectoryError),
    Store(StoreError),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::Payload(e) => write!(f, "{}", e),
            HubError::Directory(e) => write!(f, "{}", e),
            HubError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for HubError {}

impl From<PayloadError> for HubError {
    fn from(e: PayloadError) -> Self {
        HubError::Payload(e)
    }
}

impl From<DirectoryError> for HubError {
    fn from(e: DirectoryError) -> Self {
        HubError::Directory(e)
    }
}

impl From<StoreError> for HubError {
    fn from(e: StoreError) -> Self {
        HubError::Store(e)
    }
}

/// A connection accepted by the hub
pub struct Connection {
    pub handle: ConnectionHandle,
    pub connection_id: ConnectionId,
    /// Frames queued for this connection
    pub outbox: mpsc::Receiver<Frame>,
}

/// Shared hub state: record store, connection directory, metrics and the
/// shutdown signal every session listens to.
pub struct Hub {
    records: Arc<ClientRecordStore<ConnectionId>>,
    directory: ConnectionDirectory<ConnectionId>,

    /// Metrics for monitoring
    pub metrics: HubMetrics,

    next_handle: AtomicU64,
    outbox_capacity: usize,

    shutdown_tx: watch::Sender<bool>,
    active_sessions: AtomicUsize,
    sessions_idle: Notify,

    started_at: DateTime<Utc>,
}

impl Hub {
    pub fn new(settings: &HubSettings) -> Self {
        let records = Arc::new(ClientRecordStore::new());
        let directory = ConnectionDirectory::new(Arc::clone(&records));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            records,
            directory,
            metrics: HubMetrics::new(),
            next_handle: AtomicU64::new(1),
            outbox_capacity: settings.outbox_capacity.max(1),
            shutdown_tx,
            active_sessions: AtomicUsize::new(0),
            sessions_idle: Notify::new(),
            started_at: Utc::now(),
        }
    }

    /// Connecting → Open: register the connection and queue its welcome message
    pub fn connect(&self) -> Result<Connection, HubError> {
        if self.records.is_sealed() {
            return Err(StoreError::StoreUnavailable.into());
        }

        let handle = ConnectionHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let connection_id = format!("conn-{}", Uuid::new_v4().simple());
        let (outbox_tx, outbox) = mpsc::channel(self.outbox_capacity);

        self.directory
            .register(handle, connection_id.clone(), outbox_tx)?;

        if let Err(e) = self.records.open(connection_id.clone()) {
            self.directory.unregister(handle);
            return Err(e.into());
        }

        let welcome = ServerMessage::Welcome {
            connection_id: connection_id.clone(),
            records: self.records.encoded_snapshot(),
        };
        if let Some(frame) = self.frame(&welcome) {
            self.directory.send_to(handle, &frame);
        }

        self.metrics.connection_opened();
        info!(handle = %handle, connection_id = %connection_id, "Client connected");

        Ok(Connection {
            handle,
            connection_id,
            outbox,
        })
    }

    /// Open → Open: handle one inbound text frame.
    ///
    /// Malformed frames are dropped and reported back to the sender; the
    /// connection stays open. Returns the broadcast report when the frame
    /// triggered a broadcast.
    pub fn handle_text(
        &self,
        handle: ConnectionHandle,
        text: &str,
    ) -> Result<Option<BroadcastReport>, HubError> {
        self.metrics.record_message();

        let msg = match decode_client_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                self.metrics.record_malformed();
                warn!(handle = %handle, error = %e, "Dropping malformed payload");
                let reply = ServerMessage::Error {
                    error: e.to_string(),
                };
                if let Some(frame) = self.frame(&reply) {
                    self.directory.send_to(handle, &frame);
                }
                return Err(e.into());
            }
        };

        self.handle_message(handle, msg)
    }

    /// Dispatch a decoded client message
    pub fn handle_message(
        &self,
        handle: ConnectionHandle,
        msg: ClientMessage,
    ) -> Result<Option<BroadcastReport>, HubError> {
        match msg {
            ClientMessage::PositionUpdate {
                identity,
                x,
                y,
                z,
                seq,
            } => {
                let package = ClientPackage::new(identity, Position::new(x, y, z));
                self.update_position(handle, package, seq)
            }
            ClientMessage::Despawn { identity } => Ok(self.despawn(handle, identity)),
            ClientMessage::Chat { user, message } => Ok(self.chat(handle, user, message)),
        }
    }

    /// Relay a chat line to every other connection
    fn chat(
        &self,
        handle: ConnectionHandle,
        user: String,
        message: String,
    ) -> Option<BroadcastReport> {
        if !self.directory.contains(handle) {
            return None;
        }

        self.metrics.record_chat();
        debug!(handle = %handle, user = %user, "Relaying chat message");
        Some(self.broadcast(handle, &ServerMessage::Chat { user, message }))
    }

    fn update_position(
        &self,
        handle: ConnectionHandle,
        package: ClientPackage,
        seq: Option<u64>,
    ) -> Result<Option<BroadcastReport>, HubError> {
        // Connection no longer open
        let connection_id = match self.directory.client_id(handle) {
            Some(id) => id,
            None => return Ok(None),
        };

        match self.records.apply(&connection_id, package, seq)? {
            UpdateOutcome::Applied => {
                self.metrics.record_applied();
                Ok(Some(self.broadcast_snapshot(handle)))
            }
            UpdateOutcome::Stale => {
                self.metrics.record_stale();
                debug!(handle = %handle, seq = ?seq, "Ignoring out-of-order update");
                Ok(None)
            }
            UpdateOutcome::NotRegistered => Ok(None),
        }
    }

    fn despawn(&self, handle: ConnectionHandle, identity: NetworkIdentity) -> Option<BroadcastReport> {
        let connection_id = self.directory.client_id(handle)?;
        let cleared = self.records.reset(&connection_id)?;

        if cleared.identity != identity {
            debug!(
                handle = %handle,
                reported = %cleared.identity,
                requested = %identity,
                "Despawn identity differs from reported identity"
            );
        }

        info!(handle = %handle, identity = %cleared.identity, "Entity despawned");
        Some(self.broadcast(
            handle,
            &ServerMessage::Despawned {
                identity: cleared.identity,
            },
        ))
    }

    /// Open → Closing → Closed: unregister the connection and remove its record.
    ///
    /// Idempotent. Peers are told about the departed entity if it had reported one.
    pub fn disconnect(&self, handle: ConnectionHandle) -> Option<ConnectionId> {
        let reported = self
            .directory
            .client_id(handle)
            .and_then(|id| self.records.get(&id))
            .and_then(|record| record.package);

        let connection_id = self.directory.unregister(handle)?;
        self.metrics.connection_closed();
        info!(handle = %handle, connection_id = %connection_id, "Client disconnected");

        if let Some(package) = reported {
            self.broadcast(
                handle,
                &ServerMessage::Despawned {
                    identity: package.identity,
                },
            );
        }

        Some(connection_id)
    }

    /// Encode the current snapshot and send it to every connection but `sender`
    pub fn broadcast_snapshot(&self, sender: ConnectionHandle) -> BroadcastReport {
        let records = self.records.encoded_snapshot();
        self.broadcast(sender, &ServerMessage::Transforms { records })
    }

    fn broadcast(&self, sender: ConnectionHandle, msg: &ServerMessage) -> BroadcastReport {
        let frame = match self.frame(msg) {
            Some(frame) => frame,
            None => return BroadcastReport::default(),
        };

        let report = self.directory.broadcast_except(sender, &frame);
        self.metrics.record_broadcast(report);
        if report.failed > 0 {
            warn!(
                sender = %sender,
                delivered = report.delivered,
                failed = report.failed,
                "Broadcast partially failed"
            );
        }
        report
    }

    fn frame(&self, msg: &ServerMessage) -> Option<Frame> {
        match msg.to_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!(error = %e, kind = msg.tag(), "Failed to encode server message");
                None
            }
        }
    }

    /// Receiver that flips to `true` once shutdown starts
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Count a running session until the returned guard is dropped
    pub fn track_session(self: &Arc<Self>) -> SessionGuard {
        self.active_sessions.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            hub: Arc::clone(self),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    /// Reject new work and ask every session to close. Idempotent.
    pub fn begin_shutdown(&self) {
        self.records.seal();
        if !self.shutdown_tx.send_replace(true) {
            info!(sessions = self.active_sessions(), "Hub shutting down");
        }
    }

    /// `begin_shutdown`, then wait for every session to finish.
    ///
    /// Returns false if sessions were still running when `timeout` elapsed.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.begin_shutdown();

        let wait_idle = async {
            loop {
                let idle = self.sessions_idle.notified();
                if self.active_sessions() == 0 {
                    break;
                }
                idle.await;
            }
        };

        match tokio::time::timeout(timeout, wait_idle).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    sessions = self.active_sessions(),
                    "Drain timed out with sessions still open"
                );
                false
            }
        }
    }

    /// Drop every connection and record. Call only after `drain`.
    pub fn release(&self) {
        let connections = self.directory.len();
        self.directory.clear();
        self.records.clear();
        info!(connections = connections, "Hub resources released");
    }

    pub fn records(&self) -> &Arc<ClientRecordStore<ConnectionId>> {
        &self.records
    }

    pub fn connections(&self) -> Vec<ConnectionInfo<ConnectionId>> {
        self.directory.connections()
    }

    pub fn connection_count(&self) -> usize {
        self.directory.len()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Keeps a session counted as active while alive
pub struct SessionGuard {
    hub: Arc<Hub>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.hub.active_sessions.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.hub.sessions_idle.notify_waiters();
        }
    }
}
