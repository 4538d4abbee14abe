use crate::hub::{Hub, Session};
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state for the state-sync WebSocket handler
#[derive(Clone)]
pub struct SyncAppState {
    pub hub: Arc<Hub>,
}

/// GET <route> - WebSocket upgrade handler
pub async fn sync_handler(ws: WebSocketUpgrade, State(state): State<Arc<SyncAppState>>) -> Response {
    if state.hub.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Shutting down").into_response();
    }

    info!("WebSocket upgrade request received");
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| Session::new(hub).run(socket))
}

/// Create the state-sync router, serving the WebSocket at `route`
pub fn create_sync_router(state: Arc<SyncAppState>, route: &str) -> Router {
    Router::new()
        .route(route, get(sync_handler))
        .with_state(state)
}
