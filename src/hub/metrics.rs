use crate::registry::BroadcastReport;
use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Rate window for inbound message accounting (milliseconds)
const RATE_WINDOW_MS: i64 = 5000;

/// Counters for hub traffic and failures
#[derive(Clone)]
pub struct HubMetrics {
    /// Inbound frames received (lifetime counter)
    messages_total: Arc<AtomicU64>,

    /// Inbound timestamps for rate calculation (sliding 5-second window)
    message_timestamps: Arc<RwLock<VecDeque<i64>>>,

    updates_applied: Arc<AtomicU64>,
    updates_stale: Arc<AtomicU64>,
    malformed_payloads: Arc<AtomicU64>,
    chat_messages: Arc<AtomicU64>,

    broadcasts: Arc<AtomicU64>,
    broadcast_deliveries: Arc<AtomicU64>,
    broadcast_failures: Arc<AtomicU64>,

    active_connections: Arc<AtomicU64>,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self {
            messages_total: Arc::new(AtomicU64::new(0)),
            message_timestamps: Arc::new(RwLock::new(VecDeque::new())),
            updates_applied: Arc::new(AtomicU64::new(0)),
            updates_stale: Arc::new(AtomicU64::new(0)),
            malformed_payloads: Arc::new(AtomicU64::new(0)),
            chat_messages: Arc::new(AtomicU64::new(0)),
            broadcasts: Arc::new(AtomicU64::new(0)),
            broadcast_deliveries: Arc::new(AtomicU64::new(0)),
            broadcast_failures: Arc::new(AtomicU64::new(0)),
            active_connections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record one inbound frame
    pub fn record_message(&self) {
        self.record_message_at(Utc::now().timestamp_millis());
    }

    fn record_message_at(&self, now: i64) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);

        let mut timestamps = self
            .message_timestamps
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        timestamps.push_back(now);
        prune_window(&mut timestamps, now);
    }

    pub fn record_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.updates_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chat(&self) {
        self.chat_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, report: BroadcastReport) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.broadcast_deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.broadcast_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Inbound frames per second over the last 5 seconds
    pub fn message_rate(&self) -> f64 {
        self.message_rate_at(Utc::now().timestamp_millis())
    }

    fn message_rate_at(&self, now: i64) -> f64 {
        // Prune here too, otherwise an idle hub keeps reporting its last burst
        let mut timestamps = self
            .message_timestamps
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        prune_window(&mut timestamps, now);
        timestamps.len() as f64 / (RATE_WINDOW_MS as f64 / 1000.0)
    }

    pub fn malformed_payloads(&self) -> u64 {
        self.malformed_payloads.load(Ordering::Relaxed)
    }

    pub fn broadcast_failures(&self) -> u64 {
        self.broadcast_failures.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_total: self.messages_total.load(Ordering::Relaxed),
            message_rate: self.message_rate(),
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            updates_stale: self.updates_stale.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads(),
            chat_messages: self.chat_messages.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            broadcast_deliveries: self.broadcast_deliveries.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures(),
            active_connections: self.active_connections(),
        }
    }
}

/// Drop entries older than the rate window
fn prune_window(timestamps: &mut VecDeque<i64>, now: i64) {
    while let Some(&oldest) = timestamps.front() {
        if now - oldest > RATE_WINDOW_MS {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of hub metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages_total: u64,
    pub message_rate: f64,
    pub updates_applied: u64,
    pub updates_stale: u64,
    pub malformed_payloads: u64,
    pub chat_messages: u64,
    pub broadcasts: u64,
    pub broadcast_deliveries: u64,
    pub broadcast_failures: u64,
    pub active_connections: u64,
}
