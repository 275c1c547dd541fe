//! Per-event processing metrics of one subscriber

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;

use contracts::EventName;
use observability::RunningStats;

/// Snapshot for one event name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMetrics {
    /// Successful handler runs
    pub processed: u64,
    pub errors: u64,
    pub last_processed: Option<DateTime<Utc>>,
    /// Message of the latest failure
    pub last_error: Option<String>,
    /// Running mean over successful runs
    pub avg_processing_ms: f64,
}

#[derive(Debug, Default)]
struct Entry {
    metrics: SubscriptionMetrics,
    latency: RunningStats,
}

#[derive(Debug, Default)]
pub(crate) struct MetricsTable {
    entries: DashMap<EventName, Entry>,
}

impl MetricsTable {
    /// Create an empty entry so subscribed-but-idle events show up
    pub(crate) fn track(&self, event: &EventName) {
        self.entries.entry(event.clone()).or_default();
    }

    pub(crate) fn record_success(&self, event: &EventName, elapsed_ms: f64) {
        let mut entry = self.entries.entry(event.clone()).or_default();
        entry.latency.push(elapsed_ms);
        entry.metrics.avg_processing_ms = entry.latency.mean();
        entry.metrics.processed += 1;
        entry.metrics.last_processed = Some(Utc::now());
    }

    pub(crate) fn record_error(&self, event: &EventName, error: String) {
        let mut entry = self.entries.entry(event.clone()).or_default();
        entry.metrics.errors += 1;
        entry.metrics.last_error = Some(error);
    }

    pub(crate) fn get(&self, event: &str) -> Option<SubscriptionMetrics> {
        self.entries.get(event).map(|e| e.metrics.clone())
    }

    pub(crate) fn snapshot(&self) -> HashMap<EventName, SubscriptionMetrics> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().metrics.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_tracks_successes_only() {
        let table = MetricsTable::default();
        let name = EventName::new("e");

        table.record_success(&name, 10.0);
        table.record_success(&name, 30.0);
        table.record_error(&name, "boom".into());

        let m = table.get("e").unwrap();
        assert_eq!(m.processed, 2);
        assert_eq!(m.errors, 1);
        assert!((m.avg_processing_ms - 20.0).abs() < 1e-9);
        assert_eq!(m.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_track_creates_empty_entry() {
        let table = MetricsTable::default();
        table.track(&EventName::new("idle"));
        assert_eq!(table.get("idle"), Some(SubscriptionMetrics::default()));
    }
}
