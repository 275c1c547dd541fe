//! Per-event metrics for observability

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;

use contracts::EventName;

/// Snapshot of the metrics of a single event name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetrics {
    /// Total emits (including emits with no listener)
    pub emit_count: u64,
    /// Currently registered listeners
    pub listener_count: usize,
    /// Total handler failures
    pub error_count: u64,
    /// Time of the latest emit
    pub last_emitted: Option<DateTime<Utc>>,
}

/// Metrics table keyed by event name
///
/// Each entry is mutated under its shard lock, so concurrent emits on
/// different event names do not contend.
#[derive(Debug, Default)]
pub(crate) struct MetricsTable {
    entries: DashMap<EventName, EventMetrics>,
}

impl MetricsTable {
    /// Increment emit count and stamp the emit time
    pub(crate) fn inc_emit_count(&self, event: &EventName) {
        let mut entry = self.entries.entry(event.clone()).or_default();
        entry.emit_count += 1;
        entry.last_emitted = Some(Utc::now());
    }

    /// Increment error count
    pub(crate) fn inc_error_count(&self, event: &EventName) {
        self.entries.entry(event.clone()).or_default().error_count += 1;
    }

    /// Set current listener count
    pub(crate) fn set_listener_count(&self, event: &EventName, count: usize) {
        self.entries.entry(event.clone()).or_default().listener_count = count;
    }

    pub(crate) fn get(&self, event: &str) -> Option<EventMetrics> {
        self.entries.get(event).map(|m| m.clone())
    }

    pub(crate) fn snapshot(&self) -> HashMap<EventName, EventMetrics> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Drop all counters; listener counts are re-seeded by the caller
    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}
