//! Envelope - payload plus delivery metadata
//!
//! Delivery bookkeeping (ack requests, retry counters) travels next to the
//! payload instead of being written into it, so a caller's data is never
//! mutated by the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::EventName;

/// Delivery metadata attached to every dispatched payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    /// Publisher is waiting for acknowledgements
    #[serde(default)]
    pub require_ack: bool,

    /// Event name acknowledgements must be sent to
    #[serde(default)]
    pub ack_event: Option<EventName>,

    /// Number of retry attempts already made for this payload
    #[serde(default)]
    pub retry_count: u32,

    /// Subscription a retry is addressed to; other listeners of the retry
    /// event skip it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_target: Option<Uuid>,
}

/// Payload as seen by listeners
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: Value,
    #[serde(default)]
    pub metadata: EnvelopeMeta,
}

impl Envelope {
    /// Wrap a payload with empty metadata.
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            metadata: EnvelopeMeta::default(),
        }
    }

    /// Wrap a payload and request acknowledgements on `ack_event`.
    pub fn with_ack(payload: impl Into<Value>, ack_event: EventName) -> Self {
        Self {
            payload: payload.into(),
            metadata: EnvelopeMeta {
                require_ack: true,
                ack_event: Some(ack_event),
                ..EnvelopeMeta::default()
            },
        }
    }

    /// Same payload and ack request, with the retry counter bumped by one.
    pub fn next_retry(&self) -> Self {
        let mut next = self.clone();
        next.metadata.retry_count += 1;
        next
    }

    /// Restrict delivery to the listener identified by `target`.
    pub fn addressed_to(mut self, target: Uuid) -> Self {
        self.metadata.retry_target = Some(target);
        self
    }

    /// Untargeted envelopes are for everyone.
    pub fn is_for(&self, listener: Uuid) -> bool {
        !matches!(self.metadata.retry_target, Some(target) if target != listener)
    }

    /// Replace the payload, keeping the metadata.
    pub fn map_payload(self, f: impl FnOnce(Value) -> Value) -> Self {
        Self {
            payload: f(self.payload),
            metadata: self.metadata,
        }
    }

    /// Ack target if the publisher asked for one.
    pub fn ack_target(&self) -> Option<&EventName> {
        if self.metadata.require_ack {
            self.metadata.ack_event.as_ref()
        } else {
            None
        }
    }
}

impl From<Value> for Envelope {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_retry_does_not_touch_original() {
        let original = Envelope::new(json!({"id": 1}));
        let retried = original.next_retry().next_retry();

        assert_eq!(original.metadata.retry_count, 0);
        assert_eq!(retried.metadata.retry_count, 2);
        assert_eq!(retried.payload, json!({"id": 1}));
    }

    #[test]
    fn test_ack_target_requires_flag() {
        let mut env = Envelope::with_ack(json!(1), "e:ack".into());
        assert_eq!(env.ack_target().map(|e| e.as_str()), Some("e:ack"));

        env.metadata.require_ack = false;
        assert!(env.ack_target().is_none());
    }

    #[test]
    fn test_addressed_envelope_skips_other_listeners() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        let broadcast = Envelope::new(json!(1));
        assert!(broadcast.is_for(me) && broadcast.is_for(other));

        let targeted = broadcast.next_retry().addressed_to(me);
        assert!(targeted.is_for(me));
        assert!(!targeted.is_for(other));
        assert_eq!(targeted.metadata.retry_count, 1);
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let env = Envelope::with_ack(json!(null), "x:ack".into());
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["metadata"]["requireAck"], json!(true));
        assert_eq!(value["metadata"]["ackEvent"], json!("x:ack"));
    }
}
