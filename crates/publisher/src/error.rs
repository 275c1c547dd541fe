//! Publisher error types

use thiserror::Error;

use contracts::BusError;

/// Outcome errors of `Publisher::publish` and friends.
///
/// `Clone` because a grouped batch emission delivers one outcome to every
/// caller queued in that group.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// Rejected by the bus (empty name, listener ceiling)
    #[error(transparent)]
    Bus(#[from] BusError),

    /// At least one listener failed
    #[error("delivery of '{event}' failed in {failures} listener(s)")]
    Delivery {
        event: String,
        failures: usize,
        /// The event was handed to the background retry loop
        retry_scheduled: bool,
    },

    /// The publisher was destroyed (or its queue cleared) before delivery
    #[error("publish of '{event}' cancelled")]
    Cancelled { event: String },

    /// Payload could not be converted to JSON
    #[error("payload serialization failed: {message}")]
    Serialization { message: String },
}

impl PublishError {
    pub fn delivery(event: impl Into<String>, failures: usize, retry_scheduled: bool) -> Self {
        Self::Delivery {
            event: event.into(),
            failures,
            retry_scheduled,
        }
    }

    pub fn cancelled(event: impl Into<String>) -> Self {
        Self::Cancelled {
            event: event.into(),
        }
    }

    /// The caller does not need to republish; the retry loop owns the event.
    pub fn is_retry_scheduled(&self) -> bool {
        matches!(
            self,
            Self::Delivery {
                retry_scheduled: true,
                ..
            }
        )
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
