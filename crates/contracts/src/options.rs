//! Per-call delivery options shared by the publisher and subscriber crates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Advisory priority. Not a scheduling guarantee; an explicit priority only
/// makes the publisher bypass batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Options accepted by `Publisher::publish`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOptions {
    pub priority: Option<Priority>,
    /// Emit after this delay (zero = now)
    pub delay: Duration,
    /// Hand failed deliveries to the background retry loop
    pub retry: bool,
    /// Overrides the publisher's configured max retries
    pub max_retries: Option<u32>,
    /// Reserved; has no effect on in-process delivery
    pub persistent: bool,
    /// Copied into batch items
    pub metadata: Map<String, Value>,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_retry(mut self, max_retries: Option<u32>) -> Self {
        self.retry = true;
        self.max_retries = max_retries;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// What a subscriber does when its handler fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Swallow after updating metrics
    #[default]
    Ignore,
    /// Re-emit on `<event>:retry` with exponential backoff, then dead-letter
    Retry,
    /// Route straight to the dead-letter event
    DeadLetter,
}

/// `base * 2^(attempt-1)`; attempt 0 is treated as attempt 1.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 4), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, 0), base);
    }

    #[test]
    fn test_error_strategy_serde() {
        let s: ErrorStrategy = serde_json::from_str("\"dead_letter\"").unwrap();
        assert_eq!(s, ErrorStrategy::DeadLetter);
    }

    #[test]
    fn test_builder_sets_retry() {
        let opts = PublishOptions::new()
            .with_retry(Some(5))
            .with_metadata("source", "test");
        assert!(opts.retry);
        assert_eq!(opts.max_retries, Some(5));
        assert_eq!(opts.metadata["source"], "test");
    }
}
