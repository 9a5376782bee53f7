//! Bounded record of webhook delivery attempts.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// How a delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DeliveryOutcome {
    /// The target answered with a 2xx status
    Delivered { status: u16 },
    /// The target answered with a non-2xx status
    Rejected { status: u16 },
    /// No response: connection error, timeout or a bad request definition
    Failed { error: String },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Rejected { .. } => "rejected",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }
}

/// One delivery attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub job_id: String,
    pub project_id: String,
    pub endpoint_id: String,
    pub webhook: String,
    pub method: String,
    pub url: String,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
    pub duration_ms: u64,
    pub attempted_at: DateTime<Utc>,
}

/// Keeps the last `capacity` delivery records.
pub struct DeliveryHistory {
    records: Mutex<VecDeque<DeliveryRecord>>,
    capacity: usize,
}

impl DeliveryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
        }
    }

    pub fn push(&self, record: DeliveryRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// All records, oldest first.
    pub fn all(&self) -> Vec<DeliveryRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Records for one endpoint, oldest first.
    pub fn for_endpoint(&self, project_id: &str, endpoint_id: &str) -> Vec<DeliveryRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.project_id == project_id && r.endpoint_id == endpoint_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
