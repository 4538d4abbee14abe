// Network identities for replicated entities
pub mod identity;

// Wire protocol and record encoding
pub mod protocol;

// Client record store and connection directory
pub mod registry;

// Hub state machine and metrics
pub mod hub;

// HTTP and WebSocket APIs
pub mod api;

// Configuration loading
pub mod config;

// Process lifecycle: bind, serve, ordered shutdown
pub mod host;

pub use identity::NetworkIdentity;
pub use protocol::{ClientMessage, ClientPackage, Position, ServerMessage};
