//! Request log notifications.
//!
//! Every dispatch produces exactly one [`RequestLogEntry`], handed to a
//! [`RequestLogSink`]. Publishing is fire-and-forget: a sink must not block
//! and the engine never looks at the outcome.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// One record per dispatch; never mutated after publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    pub method: String,
    pub path: String,
    pub query_string: String,
    pub status_code: u16,
    pub duration_ms: u64,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_addr: Option<SocketAddr>,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of per-dispatch log entries.
pub trait RequestLogSink: Send + Sync {
    fn publish(&self, entry: RequestLogEntry);
}

/// Writes entries as structured `tracing` events under `decoy::requests`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl RequestLogSink for TracingLogSink {
    fn publish(&self, entry: RequestLogEntry) {
        info!(
            target: "decoy::requests",
            project = %entry.project_id,
            endpoint = entry.endpoint_id.as_deref().unwrap_or("-"),
            method = %entry.method,
            path = %entry.path,
            query = %entry.query_string,
            status = entry.status_code,
            duration_ms = entry.duration_ms,
            matched = entry.matched,
            error = entry.error.as_deref().unwrap_or(""),
            client = ?entry.client_addr,
            "request"
        );
    }
}

/// Keeps the most recent entries and rebroadcasts each one to live subscribers.
pub struct BroadcastLogSink {
    history: RwLock<VecDeque<RequestLogEntry>>,
    capacity: usize,
    sender: broadcast::Sender<RequestLogEntry>,
}

impl BroadcastLogSink {
    pub fn new(history: usize, broadcast_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            history: RwLock::new(VecDeque::with_capacity(history.min(4096))),
            capacity: history,
            sender,
        }
    }

    /// Subscribe to entries published from now on. Slow subscribers lag and
    /// miss entries rather than slowing dispatch.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestLogEntry> {
        self.sender.subscribe()
    }

    /// Most recent entries, oldest first.
    pub fn recent(&self) -> Vec<RequestLogEntry> {
        self.history.read().iter().cloned().collect()
    }

    /// Entries for one project, oldest first.
    pub fn recent_for_project(&self, project_id: &str) -> Vec<RequestLogEntry> {
        self.history
            .read()
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.history.write().clear();
    }
}

impl RequestLogSink for BroadcastLogSink {
    fn publish(&self, entry: RequestLogEntry) {
        if self.capacity > 0 {
            let mut history = self.history.write();
            if history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(entry.clone());
        }
        // No subscribers is fine.
        let _ = self.sender.send(entry);
    }
}

/// Fans one entry out to several sinks.
#[derive(Default)]
pub struct CompositeLogSink {
    sinks: Vec<Arc<dyn RequestLogSink>>,
}

impl CompositeLogSink {
    pub fn new(sinks: Vec<Arc<dyn RequestLogSink>>) -> Self {
        Self { sinks }
    }
}

impl RequestLogSink for CompositeLogSink {
    fn publish(&self, entry: RequestLogEntry) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(entry.clone());
            }
            last.publish(entry);
        }
    }
}
