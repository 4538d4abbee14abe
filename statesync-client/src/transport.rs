//! Transport seam between commands and the hub connection.

use statesync::{ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Handler invoked for inbound server messages of one tag
pub type Listener = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Command errors
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// No live connection to the hub
    ConnectionUnavailable,
    /// `setup_listeners` was already called on this command
    ListenerAlreadyRegistered,
    /// Entity has no network identity
    NotNetworked,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::ConnectionUnavailable => write!(f, "no active hub connection"),
            CommandError::ListenerAlreadyRegistered => {
                write!(f, "command listeners are already registered")
            }
            CommandError::NotNetworked => write!(f, "entity has no network identity"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Outbound/inbound message channel used by commands.
///
/// `send` only enqueues; delivery happens asynchronously.
pub trait Transport: Send + Sync {
    fn send(&self, msg: ClientMessage) -> Result<(), CommandError>;

    /// Add `listener` for every tag in `tags`. Several listeners may share a
    /// tag; each receives every matching message.
    fn register_listener(
        &self,
        tags: &'static [&'static str],
        listener: Listener,
    ) -> Result<(), CommandError>;
}

#[derive(Default)]
struct ListenerTable {
    by_tag: HashMap<&'static str, Vec<Listener>>,
    /// Most recent welcome/transforms, replayed to late registrations
    latest_snapshot: Option<ServerMessage>,
}

/// Tag → listeners table shared by transports.
///
/// Dispatch and registration are serialized, so a listener registered after
/// the snapshot arrived sees it exactly once and before any later message.
#[derive(Default)]
pub struct Listeners {
    delivery: Mutex<()>,
    table: Mutex<ListenerTable>,
}

impl Listeners {
    pub fn register(&self, tags: &'static [&'static str], listener: Listener) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        let replay = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            for tag in tags {
                table
                    .by_tag
                    .entry(*tag)
                    .or_default()
                    .push(Arc::clone(&listener));
            }
            table
                .latest_snapshot
                .clone()
                .filter(|msg| tags.contains(&msg.tag()))
        };

        if let Some(msg) = replay {
            trace!(tag = msg.tag(), "Replaying latest snapshot to new listener");
            listener(&msg);
        }
    }

    /// Invoke every listener registered for the message's tag.
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, msg: &ServerMessage) -> usize {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        // Clone out so handlers run without the table locked
        let listeners = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if msg.is_snapshot() {
                table.latest_snapshot = Some(msg.clone());
            }
            table.by_tag.get(msg.tag()).cloned().unwrap_or_default()
        };

        if listeners.is_empty() {
            trace!(tag = msg.tag(), "No listener for inbound message");
        }
        for listener in &listeners {
            listener(msg);
        }
        listeners.len()
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_tag
            .get(tag)
            .is_some_and(|listeners| !listeners.is_empty())
    }
}
