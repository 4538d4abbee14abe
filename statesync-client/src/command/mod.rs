//! Network commands bind one message kind to a transport and a world.
//!
//! A command is created inert. `setup_listeners` installs its inbound
//! handlers exactly once per command instance; `send` builds the outbound
//! payload and hands it to the transport without waiting for delivery.
//! Several commands of one kind (one per local entity) may share a transport.

mod chat;
mod despawn;
mod transform;

pub use chat::{Chat, ChatCommand};
pub use despawn::{Despawn, DespawnCommand, DespawnPayload};
pub use transform::{TransformCommand, TransformPayload, TransformSync};

use crate::transport::{CommandError, Transport};
use crate::world::{SharedWorld, World};
use statesync::{ClientMessage, ServerMessage};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

/// One replicated message kind: outbound payload plus inbound handling
pub trait CommandKind: Send + Sync + 'static {
    /// What `send` reads the payload from
    type Source: ?Sized;
    type Payload: Into<ClientMessage>;

    /// Server message tags this kind listens to
    const INBOUND_TAGS: &'static [&'static str];

    /// Build the outbound payload. `seq` increases with every send.
    fn payload(source: &Self::Source, seq: u64) -> Result<Self::Payload, CommandError>;

    /// Apply an inbound server message to the local world
    fn apply(world: &mut World, msg: &ServerMessage);
}

pub struct Command<K: CommandKind> {
    transport: Arc<dyn Transport>,
    world: SharedWorld,
    seq: AtomicU64,
    listening: AtomicBool,
    _kind: PhantomData<K>,
}

impl<K: CommandKind> Command<K> {
    /// Bind to a transport and world. Registers nothing.
    pub fn create(transport: Arc<dyn Transport>, world: SharedWorld) -> Self {
        Self {
            transport,
            world,
            seq: AtomicU64::new(0),
            listening: AtomicBool::new(false),
            _kind: PhantomData,
        }
    }

    /// Install inbound handlers. Fails if this command already installed them.
    pub fn setup_listeners(&self) -> Result<(), CommandError> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(CommandError::ListenerAlreadyRegistered);
        }

        let world = Arc::clone(&self.world);
        let registered = self.transport.register_listener(
            K::INBOUND_TAGS,
            Arc::new(move |msg: &ServerMessage| {
                let mut world = world.write().unwrap_or_else(PoisonError::into_inner);
                K::apply(&mut world, msg);
            }),
        );
        if registered.is_err() {
            self.listening.store(false, Ordering::SeqCst);
        }
        registered
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Enqueue the payload built from `source` on the transport
    pub fn send(&self, source: &K::Source) -> Result<(), CommandError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let payload = K::payload(source, seq)?;
        self.transport.send(payload.into())
    }
}
