//! Reserved event names and payload shapes
//!
//! These payloads are emitted on the same bus as user events and are
//! serialized with camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{ErrorInfo, EventName};

/// Reserved event carrying handler failures
pub const ERROR_EVENT: &str = "error";
/// Default dead-letter event name
pub const DEAD_LETTER_EVENT: &str = "dead-letter";

pub const PUBLISHER_EVENT_PUBLISHED: &str = "publisher:event:published";
pub const PUBLISHER_RETRY_SUCCESS: &str = "publisher:retry:success";
pub const PUBLISHER_RETRY_FAILED: &str = "publisher:retry:failed";
pub const PUBLISHER_BATCH_FAILED: &str = "publisher:batch:failed";
pub const SUBSCRIBER_STARTED: &str = "subscriber:started";
pub const SUBSCRIBER_STOPPED: &str = "subscriber:stopped";
pub const SUBSCRIBER_ERROR: &str = "subscriber:error";

/// Payload of the reserved `"error"` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub event_name: EventName,
    pub error: String,
    /// Listener id of the failing handler
    pub handler: u64,
    pub timestamp: DateTime<Utc>,
}

/// Payload routed to the dead-letter event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEvent {
    pub original_event: EventName,
    pub error: ErrorInfo,
    pub data: Value,
    pub subscriber_id: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry of a `"<event>:batch"` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: Uuid,
    pub data: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Payload of `"<event>:batch"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvent {
    pub events: Vec<BatchItem>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `"<event>:ack"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckEvent {
    pub subscriber: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AckEvent {
    pub fn success(subscriber: impl Into<String>) -> Self {
        Self {
            subscriber: subscriber.into(),
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(subscriber: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            subscriber: subscriber.into(),
            success: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_event_wire_names() {
        let ev = ErrorEvent {
            event_name: "user:created".into(),
            error: "boom".into(),
            handler: 7,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["eventName"], json!("user:created"));
        assert_eq!(value["handler"], json!(7));
    }

    #[test]
    fn test_dead_letter_wire_names() {
        let ev = DeadLetterEvent {
            original_event: "job".into(),
            error: ErrorInfo {
                message: "m".into(),
                stack: None,
                name: "HandlerError".into(),
            },
            data: json!({"k": 1}),
            subscriber_id: "s1".into(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["originalEvent"], json!("job"));
        assert_eq!(value["subscriberId"], json!("s1"));
        assert_eq!(value["error"]["name"], json!("HandlerError"));
    }

    #[test]
    fn test_ack_success_omits_error() {
        let value = serde_json::to_value(AckEvent::success("s")).unwrap();
        assert!(value.get("error").is_none());
        assert_eq!(value["success"], json!(true));
    }
}
