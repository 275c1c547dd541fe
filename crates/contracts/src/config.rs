//! BusBlueprint - Config Loader output
//!
//! Settings for the dispatch engine, the publisher and the subscriber.
//! Every section has serde defaults so a partial file (or none) is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorStrategy, EventName, DEAD_LETTER_EVENT};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete configuration blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub publisher: PublisherConfig,

    #[serde(default)]
    pub subscriber: SubscriberConfig,
}

/// Dispatch engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Listener ceiling per event name
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,
}

fn default_max_listeners() -> usize {
    100
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_listeners: default_max_listeners(),
        }
    }
}

/// Publisher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Buffer publishes without a priority into `<event>:batch` emissions
    #[serde(default)]
    pub enable_batching: bool,

    /// Flush as soon as this many items are queued
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush this long after the first item was queued
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Default retry ceiling for `retry: true` publishes
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base; attempt n waits `base * 2^(n-1)`
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Default wait window for `publish_with_ack`
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_ack_timeout_ms() -> u64 {
    5000
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enable_batching: false,
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }
}

impl PublisherConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Subscriber settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Identity reported in acks and dead letters
    #[serde(default = "default_subscriber_id")]
    pub id: String,

    #[serde(default)]
    pub error_strategy: ErrorStrategy,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_dead_letter_event")]
    pub dead_letter_event: EventName,
}

fn default_subscriber_id() -> String {
    "subscriber".to_string()
}

fn default_dead_letter_event() -> EventName {
    EventName::new(DEAD_LETTER_EVENT)
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            id: default_subscriber_id(),
            error_strategy: ErrorStrategy::default(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            dead_letter_event: default_dead_letter_event(),
        }
    }
}

impl SubscriberConfig {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}
