//! Ack collection for `publish_with_ack`

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use contracts::{AckEvent, Handler};

use crate::lock;

/// Acknowledgements gathered by `publish_with_ack`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckOutcome {
    /// In arrival order
    pub acks: Vec<AckEvent>,
    /// No acknowledgement arrived within the wait window
    pub timed_out: bool,
}

impl AckOutcome {
    pub fn all_succeeded(&self) -> bool {
        !self.acks.is_empty() && self.acks.iter().all(|a| a.success)
    }
}

#[derive(Default)]
pub(crate) struct AckCollector {
    acks: Mutex<Vec<AckEvent>>,
    arrived: Notify,
}

impl AckCollector {
    /// Listener that records every ack it receives.
    pub(crate) fn handler(self: &Arc<Self>) -> Handler {
        let collector = Arc::clone(self);
        Handler::sync(move |env| {
            let ack: AckEvent = serde_json::from_value(env.payload)?;
            lock(&collector.acks).push(ack);
            collector.arrived.notify_one();
            Ok(())
        })
    }

    /// Return at once if acks are already in, otherwise wait for the first
    /// arrival or the timeout.
    pub(crate) async fn wait(&self, timeout: Duration) -> AckOutcome {
        if !lock(&self.acks).is_empty() {
            return self.outcome(false);
        }
        let timed_out = tokio::time::timeout(timeout, self.arrived.notified())
            .await
            .is_err();
        self.outcome(timed_out)
    }

    fn outcome(&self, timed_out: bool) -> AckOutcome {
        let acks = lock(&self.acks).clone();
        AckOutcome {
            timed_out: timed_out && acks.is_empty(),
            acks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Envelope;

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_acks() {
        let collector = Arc::new(AckCollector::default());
        let outcome = collector.wait(Duration::from_millis(100)).await;

        assert!(outcome.timed_out);
        assert!(outcome.acks.is_empty());
        assert!(!outcome.all_succeeded());
    }

    #[tokio::test]
    async fn test_collects_acks_before_wait() {
        let collector = Arc::new(AckCollector::default());
        let handler = collector.handler();
        let ack = serde_json::to_value(AckEvent::success("sub-1")).unwrap();

        handler.call(Envelope::new(ack)).await.unwrap();

        let outcome = collector.wait(Duration::from_secs(1)).await;
        assert!(!outcome.timed_out);
        assert_eq!(outcome.acks.len(), 1);
        assert!(outcome.all_succeeded());
    }

    #[tokio::test]
    async fn test_rejects_malformed_ack() {
        let collector = Arc::new(AckCollector::default());
        let result = collector
            .handler()
            .call(Envelope::new(serde_json::json!("not an ack")))
            .await;
        assert!(result.is_err());
    }
}
