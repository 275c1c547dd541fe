//! Publisher - outbound reliability layer over an [`EventBus`]

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use contracts::{
    BatchEvent, BatchItem, Envelope, EventName, PublishOptions, PublisherConfig,
    PUBLISHER_BATCH_FAILED, PUBLISHER_EVENT_PUBLISHED,
};
use event_bus::EventBus;

use crate::ack::{AckCollector, AckOutcome};
use crate::batch::{BatchGroup, BatchQueue, EnqueueAction, PendingPublish};
use crate::error::PublishError;
use crate::retry::{QueuedEvent, RetryQueue, RetryWorker};
use crate::stats::{PublisherCounters, PublisherStats};

/// Successful delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    /// Event actually emitted (`<event>:batch` for batched publishes)
    pub event: EventName,
    /// Listeners that ran
    pub listeners: usize,
    pub batched: bool,
    pub published_at: DateTime<Utc>,
}

/// One item of `publish_batch`
#[derive(Debug, Clone, Default)]
pub struct BatchEntry {
    pub event: String,
    pub payload: Value,
    pub options: PublishOptions,
}

impl BatchEntry {
    pub fn new(event: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            event: event.into(),
            payload: payload.into(),
            options: PublishOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone)]
pub struct BatchEntryResult {
    pub event: String,
    pub result: Result<PublishReceipt, PublishError>,
}

/// Per-item results of `publish_batch`, in input order
#[derive(Debug, Clone, Default)]
pub struct BatchPublishReport {
    pub results: Vec<BatchEntryResult>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchPublishReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

struct Inner {
    bus: EventBus,
    config: PublisherConfig,
    batch: BatchQueue,
    retry: Arc<RetryQueue>,
    counters: Arc<PublisherCounters>,
    cancel: CancellationToken,
    destroyed: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Outbound reliability layer.
///
/// Wraps a shared [`EventBus`] with delayed delivery, batching, background
/// retry and publish-with-ack. Cheap to clone. Must be created inside a
/// tokio runtime: the retry worker is spawned at construction.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
}

impl Publisher {
    /// Create a publisher and spawn its retry worker.
    #[instrument(
        name = "publisher_new",
        skip(bus, config),
        fields(batching = config.enable_batching, batch_size = config.batch_size)
    )]
    pub fn new(bus: EventBus, config: PublisherConfig) -> Self {
        let retry = Arc::new(RetryQueue::default());
        let counters = Arc::new(PublisherCounters::default());
        let cancel = CancellationToken::new();

        let worker = RetryWorker {
            bus: bus.clone(),
            queue: Arc::clone(&retry),
            counters: Arc::clone(&counters),
            base_delay: config.retry_base_delay(),
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run());

        info!("Publisher created");

        Self {
            inner: Arc::new(Inner {
                bus,
                config,
                batch: BatchQueue::default(),
                retry,
                counters,
                cancel,
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn with_defaults(bus: EventBus) -> Self {
        Self::new(bus, PublisherConfig::default())
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.inner.config
    }

    // ===== Publish =====

    /// Publish `payload` on `event`.
    ///
    /// - `options.delay > 0`: emitted after the delay; resolves once that
    ///   emission completes
    /// - batching enabled and no explicit priority: queued until the batch
    ///   flushes; resolves with the grouped emission's outcome
    /// - otherwise emitted immediately
    ///
    /// A failed delivery with `options.retry` set is handed to the retry
    /// loop and reported as `Delivery { retry_scheduled: true }`.
    pub async fn publish(
        &self,
        event: impl AsRef<str>,
        payload: impl Into<Value>,
        options: PublishOptions,
    ) -> Result<PublishReceipt, PublishError> {
        let name = EventName::parse(event)?;
        self.route(name, Envelope::new(payload), options).await
    }

    /// Serialize `payload` with serde, then [`publish`](Self::publish).
    pub async fn publish_serialized<T: Serialize>(
        &self,
        event: impl AsRef<str>,
        payload: &T,
        options: PublishOptions,
    ) -> Result<PublishReceipt, PublishError> {
        let value = serde_json::to_value(payload)?;
        self.publish(event, value, options).await
    }

    async fn route(
        &self,
        name: EventName,
        envelope: Envelope,
        options: PublishOptions,
    ) -> Result<PublishReceipt, PublishError> {
        self.ensure_live(&name)?;

        if options.delay.is_zero() {
            return self.route_now(name, envelope, options).await;
        }

        let (tx, rx) = oneshot::channel();
        let publisher = self.clone();
        let cancel = self.inner.cancel.clone();
        let delay = options.delay;
        let event = name.clone();

        debug!(event = %name, delay_ms = delay.as_millis() as u64, "Delivery delayed");
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(PublishError::cancelled(event.as_str())),
                _ = tokio::time::sleep(delay) => publisher.route_now(event, envelope, options).await,
            };
            let _ = tx.send(result);
        });

        rx.await
            .unwrap_or_else(|_| Err(PublishError::cancelled(name.as_str())))
    }

    /// Batch or emit, ignoring `options.delay`.
    async fn route_now(
        &self,
        name: EventName,
        envelope: Envelope,
        options: PublishOptions,
    ) -> Result<PublishReceipt, PublishError> {
        self.ensure_live(&name)?;

        let batchable = self.inner.config.enable_batching
            && options.priority.is_none()
            && !envelope.metadata.require_ack;
        if batchable {
            return self.enqueue_batched(name, envelope.payload, options).await;
        }

        self.deliver(name, envelope, options.retry, options.max_retries, false)
            .await
    }

    fn ensure_live(&self, name: &EventName) -> Result<(), PublishError> {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return Err(PublishError::cancelled(name.as_str()));
        }
        Ok(())
    }

    /// Emit once and settle the outcome: stats, status event, retry hand-off.
    async fn deliver(
        &self,
        name: EventName,
        envelope: Envelope,
        retry: bool,
        max_retries: Option<u32>,
        batched: bool,
    ) -> Result<PublishReceipt, PublishError> {
        let report = self.inner.bus.emit_envelope(&name, envelope.clone()).await?;

        if report.is_clean() {
            self.inner.counters.inc_published();
            observability::record_published(&name, true);

            let receipt = PublishReceipt {
                event: name,
                listeners: report.listeners,
                batched,
                published_at: Utc::now(),
            };
            self.notify_status(
                PUBLISHER_EVENT_PUBLISHED,
                json!({
                    "eventName": receipt.event,
                    "listeners": receipt.listeners,
                    "batched": batched,
                    "timestamp": receipt.published_at,
                }),
            )
            .await;
            return Ok(receipt);
        }

        observability::record_published(&name, false);

        let max_retries = max_retries.unwrap_or(self.inner.config.max_retries);
        if retry && max_retries > 0 {
            self.inner.counters.inc_retries_scheduled();
            observability::record_retry(&name, "scheduled");
            warn!(
                event = %name,
                failures = report.failures,
                max_retries,
                "Delivery failed, retry scheduled"
            );
            self.inner.retry.push(QueuedEvent::first_retry(
                name.clone(),
                envelope,
                max_retries,
                self.inner.config.retry_base_delay(),
            ));
            return Err(PublishError::delivery(name.as_str(), report.failures, true));
        }

        self.inner.counters.inc_failed();
        warn!(event = %name, failures = report.failures, "Delivery failed");
        Err(PublishError::delivery(name.as_str(), report.failures, false))
    }

    // ===== Batching =====

    async fn enqueue_batched(
        &self,
        name: EventName,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, PublishError> {
        let (reply, rx) = oneshot::channel();
        let pending = PendingPublish {
            event: name.clone(),
            item: BatchItem {
                id: Uuid::new_v4(),
                data: payload,
                metadata: options.metadata,
            },
            retry: options.retry,
            max_retries: options.max_retries,
            reply,
        };

        match self.inner.batch.push(pending, self.inner.config.batch_size) {
            EnqueueAction::Flush => self.flush_batch(false).await,
            EnqueueAction::StartTimer => self.start_batch_timer(),
            EnqueueAction::Wait => {}
        }

        rx.await
            .unwrap_or_else(|_| Err(PublishError::cancelled(name.as_str())))
    }

    fn start_batch_timer(&self) {
        let publisher = self.clone();
        let cancel = self.inner.cancel.clone();
        let timeout = self.inner.config.batch_timeout();

        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => publisher.flush_batch(true).await,
            }
        });
        self.inner.batch.set_timer(timer);
    }

    /// Emit everything queued now, one `<event>:batch` per event name.
    pub async fn flush(&self) {
        self.flush_batch(false).await;
    }

    async fn flush_batch(&self, from_timer: bool) {
        let groups = self.inner.batch.take_groups(from_timer);
        if groups.is_empty() {
            return;
        }
        debug!(groups = groups.len(), from_timer, "Flushing batch");

        for group in groups {
            self.emit_group(group).await;
        }
    }

    async fn emit_group(&self, group: BatchGroup) {
        let BatchGroup { event, members } = group;
        let retry = members.iter().any(|m| m.retry);
        let max_retries = members.iter().filter_map(|m| m.max_retries).max();

        let (items, replies): (Vec<_>, Vec<_>) =
            members.into_iter().map(|m| (m.item, m.reply)).unzip();
        let payload = BatchEvent {
            count: items.len(),
            events: items,
            timestamp: Utc::now(),
        };

        let outcome = match serde_json::to_value(&payload) {
            Ok(value) => {
                self.inner.counters.inc_batches_flushed();
                self.deliver(event.batch(), Envelope::new(value), retry, max_retries, true)
                    .await
            }
            Err(e) => Err(PublishError::from(e)),
        };

        debug!(
            event = %event,
            count = payload.count,
            ok = outcome.is_ok(),
            "Batch group emitted"
        );
        for reply in replies {
            let _ = reply.send(outcome.clone());
        }
    }

    // ===== Batch / scheduled =====

    /// Publish each entry in order. Best effort: no rollback. Emits
    /// `publisher:batch:failed` with every result if any entry failed.
    #[instrument(name = "publisher_publish_batch", skip(self, entries), fields(count = entries.len()))]
    pub async fn publish_batch(&self, entries: Vec<BatchEntry>) -> BatchPublishReport {
        let mut report = BatchPublishReport::default();

        for entry in entries {
            let result = self
                .publish(&entry.event, entry.payload, entry.options)
                .await;
            match &result {
                Ok(_) => report.succeeded += 1,
                Err(_) => report.failed += 1,
            }
            report.results.push(BatchEntryResult {
                event: entry.event,
                result,
            });
        }

        if report.failed > 0 {
            let results: Vec<Value> = report
                .results
                .iter()
                .map(|r| match &r.result {
                    Ok(receipt) => json!({
                        "eventName": r.event,
                        "success": true,
                        "listeners": receipt.listeners,
                    }),
                    Err(e) => json!({
                        "eventName": r.event,
                        "success": false,
                        "error": e.to_string(),
                    }),
                })
                .collect();
            warn!(failed = report.failed, "Batch publish had failures");
            self.notify_status(
                PUBLISHER_BATCH_FAILED,
                json!({
                    "results": results,
                    "failed": report.failed,
                    "succeeded": report.succeeded,
                    "timestamp": Utc::now(),
                }),
            )
            .await;
        }

        report
    }

    /// Fire-and-forget publish after `delay`. Failed deliveries always go
    /// to the retry loop. Returns the schedule id.
    pub fn schedule_event(
        &self,
        event: impl AsRef<str>,
        payload: impl Into<Value>,
        delay: Duration,
        options: PublishOptions,
    ) -> Result<Uuid, PublishError> {
        let name = EventName::parse(event)?;
        self.ensure_live(&name)?;

        let id = Uuid::new_v4();
        let envelope = Envelope::new(payload);
        let options = PublishOptions {
            delay: Duration::ZERO,
            retry: true,
            ..options
        };
        let publisher = self.clone();
        let cancel = self.inner.cancel.clone();

        info!(event = %name, %id, delay_ms = delay.as_millis() as u64, "Event scheduled");
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(event = %name, %id, "Scheduled event cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = publisher.route_now(name.clone(), envelope, options).await {
                        warn!(event = %name, %id, error = %e, "Scheduled publish failed");
                    }
                }
            }
        });

        Ok(id)
    }

    // ===== Ack =====

    /// Publish with an ack request on `<event>:ack` and collect replies.
    ///
    /// Returns as soon as at least one ack is in (acks sent while the
    /// emission ran are all included), or after `timeout` (defaults to the
    /// configured ack timeout) with `timed_out = true`. A timeout is not an
    /// error. Acked publishes bypass batching.
    #[instrument(name = "publisher_publish_with_ack", skip(self, event, payload), fields(event = event.as_ref()))]
    pub async fn publish_with_ack(
        &self,
        event: impl AsRef<str>,
        payload: impl Into<Value>,
        timeout: Option<Duration>,
    ) -> Result<AckOutcome, PublishError> {
        let name = EventName::parse(event)?;
        let ack_event = name.ack();
        let timeout = timeout.unwrap_or_else(|| self.inner.config.ack_timeout());

        let collector = Arc::new(AckCollector::default());
        let subscription = self.inner.bus.on(&ack_event, collector.handler())?;

        let published = self
            .route(
                name.clone(),
                Envelope::with_ack(payload, ack_event),
                PublishOptions::default(),
            )
            .await;

        let outcome = match published {
            Ok(_) | Err(PublishError::Delivery { .. }) => Ok(collector.wait(timeout).await),
            Err(e) => Err(e),
        };
        subscription.unsubscribe();

        if let Ok(outcome) = &outcome {
            debug!(
                event = %name,
                acks = outcome.acks.len(),
                timed_out = outcome.timed_out,
                "Ack wait finished"
            );
        }
        outcome
    }

    // ===== Lifecycle =====

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            batch_queue_len: self.inner.batch.len(),
            retry_queue_len: self.inner.retry.len(),
            batching_enabled: self.inner.config.enable_batching,
            destroyed: self.inner.destroyed.load(Ordering::Acquire),
            ..self.inner.counters.snapshot()
        }
    }

    /// Drop queued batch items (their callers get `Cancelled`) and pending
    /// retries.
    pub fn clear_queue(&self) {
        let batched = self.inner.batch.cancel_all();
        let retries = self.inner.retry.clear();
        info!(batched, retries, "Publisher queues cleared");
    }

    /// Stop the retry worker, delayed deliveries and the batch timer, and
    /// clear the queues. In-flight emissions finish. Later publishes fail
    /// with `Cancelled`.
    #[instrument(name = "publisher_destroy", skip(self))]
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();
        self.clear_queue();
        info!("Publisher destroyed");
    }

    async fn notify_status(&self, event: &str, payload: Value) {
        if let Err(e) = self.inner.bus.emit(event, payload).await {
            warn!(event, error = %e, "Failed to emit status event");
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
