//! Subscriber - inbound reliability layer over an [`EventBus`]

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use contracts::{
    backoff_delay, AckEvent, BusError, DeadLetterEvent, Envelope, ErrorStrategy, EventName,
    Handler, HandlerFailure, SubscriberConfig, SUBSCRIBER_ERROR, SUBSCRIBER_STARTED,
    SUBSCRIBER_STOPPED,
};
use event_bus::{EventBus, Subscription};

use crate::combinators::{debounce, throttle};
use crate::metrics::{MetricsTable, SubscriptionMetrics};
use crate::options::{Filter, SubscribeOptions, Transform};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    bus: EventBus,
    config: SubscriberConfig,
    active: AtomicBool,
    /// Cancels pending retry timers; replaced on every `start`
    retry_cancel: Mutex<CancellationToken>,
    metrics: MetricsTable,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Inner {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn retry_token(&self) -> CancellationToken {
        lock(&self.retry_cancel).clone()
    }

    async fn emit_quietly(&self, event: &str, payload: Value) {
        if let Err(e) = self.bus.emit(event, payload).await {
            warn!(subscriber = %self.config.id, event, error = %e, "Failed to emit");
        }
    }
}

/// Inbound reliability layer.
///
/// Every subscription registers a wrapped handler on the shared bus. The
/// wrapper applies filter and transform, times the handler, sends acks when
/// the publisher asked for them and applies the error strategy on failure.
/// A new subscriber is inactive: wrapped handlers are no-ops until
/// [`start`](Self::start).
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<Inner>,
}

impl Subscriber {
    pub fn new(bus: EventBus, config: SubscriberConfig) -> Self {
        debug!(subscriber = %config.id, strategy = ?config.error_strategy, "Subscriber created");
        Self {
            inner: Arc::new(Inner {
                bus,
                config,
                active: AtomicBool::new(false),
                retry_cancel: Mutex::new(CancellationToken::new()),
                metrics: MetricsTable::default(),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscriber with default configuration and the given id
    pub fn with_id(bus: EventBus, id: impl Into<String>) -> Self {
        Self::new(bus, SubscriberConfig::default().with_id(id))
    }

    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.inner.config
    }

    // ===== Lifecycle =====

    /// Activate and emit `subscriber:started`. No-op when already active.
    pub fn start(&self) {
        if self.inner.active.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut token = lock(&self.inner.retry_cancel);
            if token.is_cancelled() {
                *token = CancellationToken::new();
            }
        }
        info!(subscriber = %self.id(), "Subscriber started");
        self.emit_status(SUBSCRIBER_STARTED);
    }

    /// Deactivate, cancel pending retries and emit `subscriber:stopped`.
    /// Running handlers are not interrupted.
    pub fn stop(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }
        lock(&self.inner.retry_cancel).cancel();
        info!(subscriber = %self.id(), "Subscriber stopped");
        self.emit_status(SUBSCRIBER_STOPPED);
    }

    fn emit_status(&self, event: &str) {
        let payload = json!({ "subscriberId": self.id(), "timestamp": Utc::now() });
        if let Err(e) = self.inner.bus.emit_sync(event, payload) {
            warn!(subscriber = %self.id(), event, error = %e, "Failed to emit status");
        }
    }

    // ===== Subscribe =====

    /// Register a wrapped handler for `options.event`.
    ///
    /// With the `Retry` strategy the same wrapper is also registered on
    /// `<event>:retry`; the returned handle covers both.
    #[instrument(
        name = "subscriber_subscribe",
        skip(self, options),
        fields(subscriber = %self.id(), event = %options.event)
    )]
    pub fn subscribe(&self, options: SubscribeOptions) -> Result<Subscription, BusError> {
        self.register(options, |handler| handler)
    }

    pub fn subscribe_filtered(
        &self,
        event: impl Into<String>,
        filter: impl Fn(&Value) -> bool + Send + Sync + 'static,
        handler: Handler,
    ) -> Result<Subscription, BusError> {
        self.subscribe(SubscribeOptions::new(event, handler).filter(filter))
    }

    pub fn subscribe_transformed(
        &self,
        event: impl Into<String>,
        transform: impl Fn(Value) -> Value + Send + Sync + 'static,
        handler: Handler,
    ) -> Result<Subscription, BusError> {
        self.subscribe(SubscribeOptions::new(event, handler).transform(transform))
    }

    /// Invocations within `interval` of the last accepted one are dropped
    /// before any filtering or metrics.
    pub fn subscribe_throttled(
        &self,
        event: impl Into<String>,
        handler: Handler,
        interval: Duration,
    ) -> Result<Subscription, BusError> {
        self.register(SubscribeOptions::new(event, handler), |h| {
            throttle(h, interval)
        })
    }

    /// Only the last payload of a burst is processed, `quiet` after the burst.
    pub fn subscribe_debounced(
        &self,
        event: impl Into<String>,
        handler: Handler,
        quiet: Duration,
    ) -> Result<Subscription, BusError> {
        self.register(SubscribeOptions::new(event, handler), |h| debounce(h, quiet))
    }

    /// Same handler on several events; one handle for all of them. Nothing
    /// stays registered if any event is rejected.
    pub fn subscribe_to_multiple<I, S>(
        &self,
        events: I,
        handler: Handler,
    ) -> Result<Subscription, BusError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members = Vec::new();
        for event in events {
            match self.subscribe(SubscribeOptions::new(event, handler.clone())) {
                Ok(sub) => members.push(sub),
                Err(e) => {
                    for sub in &members {
                        sub.unsubscribe();
                    }
                    return Err(e);
                }
            }
        }
        Ok(Subscription::group(members))
    }

    /// Subscribe to every event currently known to the bus whose name
    /// matches `pattern`. Events registered later are not picked up.
    pub fn subscribe_to_pattern(
        &self,
        pattern: &str,
        handler: Handler,
    ) -> Result<Subscription, BusError> {
        let regex = Regex::new(pattern)
            .map_err(|e| BusError::validation(format!("invalid pattern '{pattern}': {e}")))?;

        let matching: Vec<String> = self
            .inner
            .bus
            .event_names()
            .into_iter()
            .filter(|name| regex.is_match(name))
            .map(|name| name.to_string())
            .collect();

        debug!(subscriber = %self.id(), pattern, matched = matching.len(), "Pattern subscription");
        self.subscribe_to_multiple(matching, handler)
    }

    fn register(
        &self,
        options: SubscribeOptions,
        decorate: impl FnOnce(Handler) -> Handler,
    ) -> Result<Subscription, BusError> {
        let event = EventName::parse(&options.event)?;
        let config = &self.inner.config;
        let strategy = options.effective_strategy(config.error_strategy);

        let wrapper = Arc::new(Wrapper {
            id: Uuid::new_v4(),
            subscriber: Arc::downgrade(&self.inner),
            event: event.clone(),
            handler: options.handler,
            filter: options.filter,
            transform: options.transform,
            strategy,
            max_retries: options.max_retries.unwrap_or(config.max_retries),
            base_delay: config.retry_base_delay(),
            dead_letter_event: options
                .dead_letter_event
                .unwrap_or_else(|| config.dead_letter_event.clone()),
        });
        let handler = decorate(wrapper.into_handler());

        let primary = if options.once {
            self.inner.bus.once(&event, handler.clone())?
        } else {
            self.inner.bus.on(&event, handler.clone())?
        };

        let subscription = if strategy == ErrorStrategy::Retry {
            match self.inner.bus.on(event.retry(), handler) {
                Ok(retry) => Subscription::group(vec![primary, retry]),
                Err(e) => {
                    primary.unsubscribe();
                    return Err(e);
                }
            }
        } else {
            primary
        };

        self.inner.metrics.track(&event);
        lock(&self.inner.subscriptions).push(subscription.clone());
        debug!(
            subscriber = %self.id(),
            event = %event,
            strategy = ?strategy,
            "Subscribed"
        );
        Ok(subscription)
    }

    /// Remove every registration made through this subscriber.
    pub fn unsubscribe_all(&self) -> usize {
        let subscriptions = std::mem::take(&mut *lock(&self.inner.subscriptions));
        let removed = subscriptions.iter().filter(|s| s.unsubscribe()).count();
        info!(subscriber = %self.id(), removed, "Unsubscribed all");
        removed
    }

    // ===== Metrics =====

    pub fn metrics(&self) -> HashMap<EventName, SubscriptionMetrics> {
        self.inner.metrics.snapshot()
    }

    pub fn event_metrics(&self, event: impl AsRef<str>) -> Option<SubscriptionMetrics> {
        self.inner.metrics.get(event.as_ref())
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Per-subscription processing pipeline
struct Wrapper {
    /// Address of this subscription's own retries
    id: Uuid,
    subscriber: Weak<Inner>,
    /// Original event name; retries are accounted under it too
    event: EventName,
    handler: Handler,
    filter: Option<Filter>,
    transform: Option<Transform>,
    strategy: ErrorStrategy,
    max_retries: u32,
    base_delay: Duration,
    dead_letter_event: EventName,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriberErrorEvent<'a> {
    subscriber_id: &'a str,
    event_name: &'a EventName,
    error: String,
    retry_count: u32,
    timestamp: chrono::DateTime<Utc>,
}

impl Wrapper {
    fn into_handler(self: Arc<Self>) -> Handler {
        Handler::new(move |envelope| {
            let wrapper = Arc::clone(&self);
            async move {
                wrapper.process(envelope).await;
                Ok(())
            }
        })
    }

    /// Failures are fully handled here and never reach the bus.
    async fn process(&self, envelope: Envelope) {
        let Some(sub) = self.subscriber.upgrade() else {
            return;
        };
        if !sub.is_active() || !envelope.is_for(self.id) {
            return;
        }
        if let Some(filter) = &self.filter {
            if !filter(&envelope.payload) {
                return;
            }
        }

        let input = match &self.transform {
            Some(transform) => envelope.clone().map_payload(|p| transform(p)),
            None => envelope.clone(),
        };

        let started = Instant::now();
        let result = self.handler.call_caught(input).await;

        match result {
            Ok(()) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                sub.metrics.record_success(&self.event, elapsed_ms);
                observability::record_processing_ms(&sub.config.id, elapsed_ms);

                // Stopped while the handler ran
                if !sub.is_active() {
                    return;
                }
                if let Some(ack_event) = envelope.ack_target() {
                    self.send_ack(&sub, ack_event, AckEvent::success(sub.config.id.as_str()))
                        .await;
                }
            }
            Err(failure) => self.handle_failure(&sub, envelope, failure).await,
        }
    }

    async fn handle_failure(&self, sub: &Arc<Inner>, envelope: Envelope, failure: HandlerFailure) {
        let message = failure.to_string();
        sub.metrics.record_error(&self.event, message.clone());
        warn!(
            subscriber = %sub.config.id,
            event = %self.event,
            retry_count = envelope.metadata.retry_count,
            error = %message,
            "Handler failed"
        );

        if !sub.is_active() {
            return;
        }

        let report = SubscriberErrorEvent {
            subscriber_id: &sub.config.id,
            event_name: &self.event,
            error: message.clone(),
            retry_count: envelope.metadata.retry_count,
            timestamp: Utc::now(),
        };
        match serde_json::to_value(&report) {
            Ok(payload) => sub.emit_quietly(SUBSCRIBER_ERROR, payload).await,
            Err(e) => warn!(error = %e, "Failed to encode subscriber error"),
        }

        if let Some(ack_event) = envelope.ack_target() {
            let ack = AckEvent::failure(sub.config.id.as_str(), message);
            self.send_ack(sub, ack_event, ack).await;
        }

        if !sub.is_active() {
            return;
        }
        match self.strategy {
            ErrorStrategy::Ignore => {}
            ErrorStrategy::Retry => self.schedule_retry(sub, envelope, failure).await,
            ErrorStrategy::DeadLetter => self.dead_letter(sub, envelope, &failure).await,
        }
    }

    /// Re-emit on `<event>:retry` after backoff, addressed to this
    /// subscription only, or dead-letter once the retry budget is spent.
    async fn schedule_retry(&self, sub: &Arc<Inner>, envelope: Envelope, failure: HandlerFailure) {
        let next = envelope.next_retry().addressed_to(self.id);
        let attempt = next.metadata.retry_count;
        if attempt > self.max_retries {
            debug!(
                subscriber = %sub.config.id,
                event = %self.event,
                attempts = attempt - 1,
                "Retries exhausted"
            );
            self.dead_letter(sub, envelope, &failure).await;
            return;
        }

        let delay = backoff_delay(self.base_delay, attempt);
        let cancel = sub.retry_token();
        let subscriber = Weak::clone(&self.subscriber);
        let bus = sub.bus.clone();
        let retry_event = self.event.retry();
        let subscriber_id = sub.config.id.clone();

        debug!(
            subscriber = %subscriber_id,
            event = %retry_event,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Retry scheduled"
        );
        observability::record_retry(&self.event, "scheduled");

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(subscriber = %subscriber_id, event = %retry_event, "Retry cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let still_active = subscriber.upgrade().is_some_and(|s| s.is_active());
                    if still_active {
                        if let Err(e) = bus.emit_envelope(&retry_event, next).await {
                            warn!(subscriber = %subscriber_id, error = %e, "Retry emit failed");
                        }
                    }
                }
            }
        });
    }

    async fn dead_letter(&self, sub: &Arc<Inner>, envelope: Envelope, failure: &HandlerFailure) {
        let letter = DeadLetterEvent {
            original_event: self.event.clone(),
            error: failure.info(),
            data: envelope.payload,
            subscriber_id: sub.config.id.clone(),
            timestamp: Utc::now(),
        };
        observability::record_dead_letter(&self.event);
        warn!(
            subscriber = %sub.config.id,
            event = %self.event,
            dead_letter = %self.dead_letter_event,
            "Routed to dead letter"
        );

        match serde_json::to_value(&letter) {
            Ok(payload) => sub.emit_quietly(&self.dead_letter_event, payload).await,
            Err(e) => warn!(error = %e, "Failed to encode dead letter"),
        }
    }

    async fn send_ack(&self, sub: &Arc<Inner>, ack_event: &EventName, ack: AckEvent) {
        match serde_json::to_value(&ack) {
            Ok(payload) => sub.emit_quietly(ack_event, payload).await,
            Err(e) => warn!(error = %e, "Failed to encode ack"),
        }
    }
}
