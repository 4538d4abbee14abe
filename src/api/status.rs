use crate::hub::{ConnectionId, Hub, MetricsSnapshot};
use crate::registry::ConnectionInfo;
use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// State for the status API
#[derive(Clone)]
pub struct StatusAppState {
    pub hub: Arc<Hub>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub started_at: DateTime<Utc>,
    /// Open connections
    pub connections: usize,
    /// Connections that have reported a position
    pub records: usize,
    pub clients: Vec<ConnectionInfo<ConnectionId>>,
    pub metrics: MetricsSnapshot,
}

pub fn create_status_router(state: StatusAppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

/// GET /api/status
async fn get_status(State(state): State<Arc<StatusAppState>>) -> Json<StatusResponse> {
    let hub = &state.hub;
    Json(StatusResponse {
        started_at: hub.started_at(),
        connections: hub.connection_count(),
        records: hub.records().snapshot().len(),
        clients: hub.connections(),
        metrics: hub.metrics.snapshot(),
    })
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}
