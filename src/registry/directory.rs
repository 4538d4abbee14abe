use crate::protocol::Frame;
use crate::registry::records::ClientRecordStore;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Opaque reference to one open connection. Never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Directory errors
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryError {
    /// Handle is already registered
    DuplicateConnection(ConnectionHandle),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::DuplicateConnection(handle) => {
                write!(f, "connection {} is already registered", handle)
            }
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Delivery counts of one broadcast
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Recipients whose queue was full or already closed
    pub failed: usize,
}

/// Public view of a registered connection
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionInfo<C> {
    pub handle: ConnectionHandle,
    pub client_id: C,
    pub connected_at: DateTime<Utc>,
}

struct Peer<C> {
    client_id: C,
    outbox: mpsc::Sender<Frame>,
    connected_at: DateTime<Utc>,
}

/// Live connections and their outbound queues.
///
/// Generic over the client identifier `C`, which is also the key of the
/// record store the directory is built with. Unregistering a connection
/// removes its record, so the two never disagree about liveness.
pub struct ConnectionDirectory<C> {
    peers: DashMap<ConnectionHandle, Peer<C>>,
    records: Arc<ClientRecordStore<C>>,
}

impl<C> ConnectionDirectory<C>
where
    C: Eq + Hash + Clone + fmt::Display,
{
    pub fn new(records: Arc<ClientRecordStore<C>>) -> Self {
        Self {
            peers: DashMap::new(),
            records,
        }
    }

    /// Register a new connection.
    ///
    /// Fails with `DuplicateConnection` if `handle` is already present; the
    /// directory is left unchanged in that case.
    pub fn register(
        &self,
        handle: ConnectionHandle,
        client_id: C,
        outbox: mpsc::Sender<Frame>,
    ) -> Result<(), DirectoryError> {
        match self.peers.entry(handle) {
            Entry::Occupied(_) => Err(DirectoryError::DuplicateConnection(handle)),
            Entry::Vacant(slot) => {
                slot.insert(Peer {
                    client_id,
                    outbox,
                    connected_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Remove a connection and its record. No-op if absent.
    ///
    /// Returns the client id the handle was registered with.
    pub fn unregister(&self, handle: ConnectionHandle) -> Option<C> {
        let (_, peer) = self.peers.remove(&handle)?;
        self.records.remove(&peer.client_id);
        Some(peer.client_id)
    }

    /// Queue `frame` for every connection except `sender`.
    ///
    /// Never blocks: a recipient whose queue is full or closed is counted as
    /// failed and the remaining recipients still get the frame.
    pub fn broadcast_except(&self, sender: ConnectionHandle, frame: &Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for peer in self.peers.iter() {
            if *peer.key() == sender {
                continue;
            }
            match peer.outbox.try_send(Frame::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(
                        handle = %peer.key(),
                        client_id = %peer.client_id,
                        error = %e,
                        "Broadcast delivery failed"
                    );
                }
            }
        }

        report
    }

    /// Queue `frame` for a single connection. Returns false if it could not be queued.
    pub fn send_to(&self, handle: ConnectionHandle, frame: &Frame) -> bool {
        match self.peers.get(&handle) {
            Some(peer) => peer.outbox.try_send(Frame::clone(frame)).is_ok(),
            None => false,
        }
    }

    pub fn client_id(&self, handle: ConnectionHandle) -> Option<C> {
        self.peers.get(&handle).map(|peer| peer.client_id.clone())
    }

    pub fn contains(&self, handle: ConnectionHandle) -> bool {
        self.peers.contains_key(&handle)
    }

    pub fn connections(&self) -> Vec<ConnectionInfo<C>> {
        self.peers
            .iter()
            .map(|peer| ConnectionInfo {
                handle: *peer.key(),
                client_id: peer.client_id.clone(),
                connected_at: peer.connected_at,
            })
            .collect()
    }

    pub fn records(&self) -> &Arc<ClientRecordStore<C>> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drop every connection entry (outbound queues close with them)
    pub fn clear(&self) {
        self.peers.clear();
    }
}
