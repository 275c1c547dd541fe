//! Retry queue and its background worker

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use contracts::{
    backoff_delay, Envelope, EventName, PUBLISHER_RETRY_FAILED, PUBLISHER_RETRY_SUCCESS,
};
use event_bus::EventBus;

use crate::lock;
use crate::stats::PublisherCounters;

/// An emission waiting for another attempt
#[derive(Debug, Clone)]
pub(crate) struct QueuedEvent {
    pub id: Uuid,
    pub event: EventName,
    pub envelope: Envelope,
    pub enqueued_at: DateTime<Utc>,
    /// Attempt number of the next retry (1-based)
    pub retry_count: u32,
    pub max_retries: u32,
    pub not_before: Instant,
}

impl QueuedEvent {
    /// First retry of a failed emission, due after `base_delay`
    pub(crate) fn first_retry(
        event: EventName,
        envelope: Envelope,
        max_retries: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            envelope,
            enqueued_at: Utc::now(),
            retry_count: 1,
            max_retries,
            not_before: Instant::now() + backoff_delay(base_delay, 1),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RetryQueue {
    items: Mutex<VecDeque<QueuedEvent>>,
    notify: Notify,
}

impl RetryQueue {
    pub(crate) fn push(&self, item: QueuedEvent) {
        lock(&self.items).push_back(item);
        self.notify.notify_one();
    }

    /// Remove and return every item whose deadline has passed.
    fn take_due(&self, now: Instant) -> Vec<QueuedEvent> {
        let mut items = lock(&self.items);
        let (due, waiting): (VecDeque<_>, VecDeque<_>) =
            items.drain(..).partition(|item| item.not_before <= now);
        *items = waiting;
        due.into()
    }

    fn next_deadline(&self) -> Option<Instant> {
        lock(&self.items).iter().map(|item| item.not_before).min()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub(crate) fn clear(&self) -> usize {
        let mut items = lock(&self.items);
        let dropped = items.len();
        items.clear();
        dropped
    }
}

/// Single background task draining a [`RetryQueue`].
pub(crate) struct RetryWorker {
    pub bus: EventBus,
    pub queue: Arc<RetryQueue>,
    pub counters: Arc<PublisherCounters>,
    pub base_delay: Duration,
    pub cancel: CancellationToken,
}

impl RetryWorker {
    /// Sleep until an enqueue or the earliest deadline, then attempt every
    /// due item. Exits on cancellation; an attempt already emitting finishes.
    #[instrument(name = "publisher_retry_worker", skip(self))]
    pub(crate) async fn run(self) {
        debug!("Retry worker started");

        loop {
            let deadline = self.queue.next_deadline();

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.queue.notify.notified() => {}
                _ = sleep_until_deadline(deadline) => {}
            }

            for item in self.queue.take_due(Instant::now()) {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.attempt(item).await;
            }
        }

        debug!("Retry worker stopped");
    }

    async fn attempt(&self, mut item: QueuedEvent) {
        let outcome = self
            .bus
            .emit_envelope(&item.event, item.envelope.clone())
            .await;

        let error = match outcome {
            Ok(report) if report.is_clean() => {
                self.counters.inc_retries_succeeded();
                observability::record_retry(&item.event, "success");
                info!(
                    event = %item.event,
                    attempt = item.retry_count,
                    "Retry succeeded"
                );
                self.notify_status(
                    PUBLISHER_RETRY_SUCCESS,
                    json!({
                        "id": item.id,
                        "eventName": item.event,
                        "retryCount": item.retry_count,
                        "timestamp": Utc::now(),
                    }),
                )
                .await;
                return;
            }
            Ok(report) => format!("{} listener(s) failed", report.failures),
            Err(e) => e.to_string(),
        };

        item.retry_count += 1;
        if item.retry_count <= item.max_retries {
            let delay = backoff_delay(self.base_delay, item.retry_count);
            item.not_before = Instant::now() + delay;
            self.counters.inc_retries_scheduled();
            observability::record_retry(&item.event, "scheduled");
            debug!(
                event = %item.event,
                attempt = item.retry_count,
                delay_ms = delay.as_millis() as u64,
                "Retry rescheduled"
            );
            self.queue.push(item);
            return;
        }

        self.counters.inc_retries_exhausted();
        observability::record_retry(&item.event, "exhausted");
        warn!(
            event = %item.event,
            attempts = item.retry_count - 1,
            error = %error,
            "Retries exhausted, event dropped"
        );
        self.notify_status(
            PUBLISHER_RETRY_FAILED,
            json!({
                "id": item.id,
                "eventName": item.event,
                "retryCount": item.retry_count - 1,
                "enqueuedAt": item.enqueued_at,
                "error": error,
                "data": item.envelope.payload,
                "timestamp": Utc::now(),
            }),
        )
        .await;
    }

    async fn notify_status(&self, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.bus.emit(event, payload).await {
            warn!(event, error = %e, "Failed to emit status event");
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
