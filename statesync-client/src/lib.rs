//! State-sync client - replicates local entity transforms through a hub.
//!
//! # Architecture
//!
//! ```text
//!   Game loop (owns World)
//!          ↓ send(entity)
//! ┌─────────────────────────────────────────┐
//! │       Commands (TransformCommand, ...)   │
//! │  - Build payloads from entities          │
//! │  - Apply inbound messages to World       │
//! └─────────────────────────────────────────┘
//!          ↓ Transport
//! ┌─────────────────────────────────────────┐
//! │       HubConnection                      │
//! │  - Writer task: outbound queue → socket  │
//! │  - Reader task: socket → listeners       │
//! └─────────────────────────────────────────┘
//!          ↓ WebSocket
//!       State-sync hub
//! ```
//!
//! # Core Types
//!
//! - [`HubConnection`] - Live connection, implements [`Transport`]
//! - [`Command`] - Generic command bound to a transport and a [`World`]
//! - [`TransformCommand`] / [`DespawnCommand`] / [`ChatCommand`] - The replicated message kinds
//!
//! # Usage
//!
//! ```no_run
//! use statesync::Position;
//! use statesync_client::{HubConnection, TransformCommand, World};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let connection = HubConnection::connect("ws://127.0.0.1:4222/state-sync").await?;
//! let world = World::new().shared();
//! let player = world.write().unwrap().spawn_networked(Position::default());
//!
//! let transforms = TransformCommand::create(connection.clone(), world.clone());
//! transforms.setup_listeners()?;
//!
//! if let Some(entity) = world.read().unwrap().get(player) {
//!     transforms.send(entity)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod connection;
pub mod transport;
pub mod world;

pub use command::{ChatCommand, Command, CommandKind, DespawnCommand, TransformCommand};
pub use connection::HubConnection;
pub use transport::{CommandError, Listener, Listeners, Transport};
pub use world::{Authority, ChatLine, Entity, EntityId, RemoteApply, SharedWorld, World};
