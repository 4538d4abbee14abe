// HTTP and WebSocket APIs

pub mod status;
pub mod websocket;

pub use status::{create_status_router, StatusAppState, StatusResponse};
pub use websocket::{create_sync_router, sync_handler, SyncAppState};
