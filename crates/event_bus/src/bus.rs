//! EventBus - listener registry and fan-out dispatch

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use contracts::{
    BusConfig, BusError, Envelope, ErrorEvent, EventName, Handler, HandlerFailure, ERROR_EVENT,
};

use crate::metrics::{EventMetrics, MetricsTable};
use crate::namespace::Namespace;
use crate::subscription::{ListenerId, Subscription};

/// Outcome of one `emit`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Listeners invoked
    pub listeners: usize,
    /// Listeners that returned an error or panicked
    pub failures: usize,
}

impl EmitReport {
    /// No listener failed (also true when nobody listened)
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

#[derive(Clone)]
struct ListenerEntry {
    id: ListenerId,
    handler: Handler,
    once: bool,
}

type Settled = (ListenerId, Result<(), HandlerFailure>);

pub(crate) struct BusInner {
    /// Listeners per event, in registration order
    listeners: DashMap<EventName, Vec<ListenerEntry>>,
    metrics: MetricsTable,
    max_listeners: AtomicUsize,
    next_id: AtomicU64,
}

impl BusInner {
    pub(crate) fn remove_listener_by_id(&self, event: &str, id: ListenerId) -> bool {
        self.remove_first(event, |l| l.id == id)
    }

    fn remove_first(&self, event: &str, pred: impl Fn(&ListenerEntry) -> bool) -> bool {
        let Some(mut list) = self.listeners.get_mut(event) else {
            return false;
        };
        let Some(pos) = list.iter().position(pred) else {
            return false;
        };
        list.remove(pos);
        let count = list.len();
        let name = list.key().clone();
        drop(list);

        self.metrics.set_listener_count(&name, count);
        true
    }
}

/// Builder for creating an EventBus
#[derive(Debug, Clone, Default)]
pub struct EventBusBuilder {
    config: BusConfig,
}

impl EventBusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Listener ceiling per event name
    pub fn max_listeners(mut self, max: usize) -> Self {
        self.config.max_listeners = max;
        self
    }

    #[instrument(
        name = "event_bus_build",
        skip(self),
        fields(max_listeners = self.config.max_listeners)
    )]
    pub fn build(self) -> EventBus {
        debug!("EventBus created");
        EventBus {
            inner: Arc::new(BusInner {
                listeners: DashMap::new(),
                metrics: MetricsTable::default(),
                max_listeners: AtomicUsize::new(self.config.max_listeners),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

/// The dispatch engine.
///
/// Cheap to clone; every clone refers to the same registry. Build one per
/// application (or per test) and hand clones to publishers and subscribers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Bus with default configuration (100 listeners per event)
    pub fn new() -> Self {
        EventBusBuilder::new().build()
    }

    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    pub fn from_config(config: &BusConfig) -> Self {
        EventBusBuilder::new().config(config.clone()).build()
    }

    // ===== Registration =====

    /// Register a persistent listener.
    ///
    /// # Errors
    /// - `Validation` if `event` is empty
    /// - `ResourceExhausted` if the event already has `max_listeners` listeners
    pub fn on(&self, event: impl AsRef<str>, handler: Handler) -> Result<Subscription, BusError> {
        self.register(event, handler, false)
    }

    /// Register a listener that is removed before its first invocation.
    pub fn once(
        &self,
        event: impl AsRef<str>,
        handler: Handler,
    ) -> Result<Subscription, BusError> {
        self.register(event, handler, true)
    }

    /// Remove one registration of `handler`. Returns whether one was found.
    pub fn off(&self, event: impl AsRef<str>, handler: &Handler) -> bool {
        self.inner
            .remove_first(event.as_ref(), |l| l.handler.same(handler))
    }

    fn register(
        &self,
        event: impl AsRef<str>,
        handler: Handler,
        once: bool,
    ) -> Result<Subscription, BusError> {
        let name = EventName::parse(event)?;
        let max = self.max_listeners();

        let (id, count) = {
            let mut list = self.inner.listeners.entry(name.clone()).or_default();

            // A handler appears at most once per event
            if let Some(existing) = list.iter().find(|l| l.handler.same(&handler)) {
                let id = existing.id;
                drop(list);
                return Ok(Subscription::listener(Arc::downgrade(&self.inner), name, id));
            }

            if list.len() >= max {
                warn!(event = %name, max, "Max listeners reached, registration rejected");
                return Err(BusError::resource_exhausted(name.as_str(), max));
            }

            let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
            list.push(ListenerEntry { id, handler, once });
            (id, list.len())
        };

        self.inner.metrics.set_listener_count(&name, count);
        debug!(event = %name, listener = %id, once, "Listener registered");

        Ok(Subscription::listener(Arc::downgrade(&self.inner), name, id))
    }

    /// Snapshot the listeners of `event`, removing `once` entries in the same
    /// critical section so they can never run twice.
    fn take_listeners(&self, event: &EventName) -> Vec<ListenerEntry> {
        let Some(mut list) = self.inner.listeners.get_mut(event) else {
            return Vec::new();
        };
        let snapshot = list.clone();
        list.retain(|l| !l.once);
        let remaining = list.len();
        drop(list);

        if remaining != snapshot.len() {
            self.inner.metrics.set_listener_count(event, remaining);
        }
        snapshot
    }

    // ===== Dispatch =====

    /// Emit `payload` to every listener of `event` and wait for all of them.
    ///
    /// Handler failures never propagate: each one increments the event's
    /// error count and is re-published on the reserved `"error"` event.
    ///
    /// # Errors
    /// Only `Validation` for an empty event name.
    pub async fn emit(
        &self,
        event: impl AsRef<str>,
        payload: impl Into<Value>,
    ) -> Result<EmitReport, BusError> {
        self.emit_envelope(event, Envelope::new(payload)).await
    }

    /// Like [`emit`](Self::emit) with explicit delivery metadata.
    pub async fn emit_envelope(
        &self,
        event: impl AsRef<str>,
        envelope: Envelope,
    ) -> Result<EmitReport, BusError> {
        let name = EventName::parse(event)?;
        let (listeners, failures) = self.fan_out(&name, envelope).await;

        let report = EmitReport {
            listeners,
            failures: failures.len(),
        };
        for (id, failure) in failures {
            self.report_failure(&name, id, failure).await;
        }

        debug!(
            event = %name,
            listeners = report.listeners,
            failures = report.failures,
            "Event emitted"
        );
        Ok(report)
    }

    /// Emit without waiting for deferred completion.
    ///
    /// Every handler is called and polled once before this returns, so
    /// synchronous handlers have finished. Handlers still pending are driven
    /// on the current tokio runtime and report failures from there.
    /// Returns the number of listeners started.
    pub fn emit_sync(
        &self,
        event: impl AsRef<str>,
        payload: impl Into<Value>,
    ) -> Result<usize, BusError> {
        self.emit_envelope_sync(event, Envelope::new(payload))
    }

    /// Like [`emit_sync`](Self::emit_sync) with explicit delivery metadata.
    pub fn emit_envelope_sync(
        &self,
        event: impl AsRef<str>,
        envelope: Envelope,
    ) -> Result<usize, BusError> {
        let name = EventName::parse(event)?;
        let listeners = self.take_listeners(&name);
        self.inner.metrics.inc_emit_count(&name);
        observability::record_emit(&name, listeners.len());

        let mut failures = Vec::new();
        let mut pending = Vec::new();
        for listener in &listeners {
            let mut fut = Box::pin(start_listener(listener, envelope.clone()));
            match (&mut fut).now_or_never() {
                Some((id, Err(failure))) => failures.push((id, failure)),
                Some((_, Ok(()))) => {}
                None => pending.push(fut),
            }
        }

        if failures.is_empty() && pending.is_empty() {
            return Ok(listeners.len());
        }

        // Count synchronous failures before returning
        for _ in &failures {
            self.count_failure(&name);
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let bus = self.clone();
                runtime.spawn(async move {
                    for (id, failure) in failures {
                        bus.publish_failure(&name, id, failure).await;
                    }
                    for (id, result) in join_all(pending).await {
                        if let Err(failure) = result {
                            bus.report_failure(&name, id, failure).await;
                        }
                    }
                });
            }
            Err(_) => {
                for (id, failure) in &failures {
                    warn!(event = %name, listener = %id, error = %failure, "Handler failed");
                }
                if !pending.is_empty() {
                    warn!(
                        event = %name,
                        pending = pending.len(),
                        "No tokio runtime, deferred handlers dropped"
                    );
                }
            }
        }

        Ok(listeners.len())
    }

    /// Start every listener in registration order, then wait for all.
    async fn fan_out(
        &self,
        name: &EventName,
        envelope: Envelope,
    ) -> (usize, Vec<(ListenerId, HandlerFailure)>) {
        let listeners = self.take_listeners(name);
        self.inner.metrics.inc_emit_count(name);
        observability::record_emit(name, listeners.len());

        if listeners.is_empty() {
            return (0, Vec::new());
        }

        let started: Vec<_> = listeners
            .iter()
            .map(|l| start_listener(l, envelope.clone()))
            .collect();

        let failures = join_all(started)
            .await
            .into_iter()
            .filter_map(|(id, result)| result.err().map(|f| (id, f)))
            .collect();

        (listeners.len(), failures)
    }

    /// Count the failure and republish it on `"error"`. Failures of
    /// `"error"` listeners are logged only.
    async fn report_failure(&self, event: &EventName, id: ListenerId, failure: HandlerFailure) {
        self.count_failure(event);
        self.publish_failure(event, id, failure).await;
    }

    fn count_failure(&self, event: &EventName) {
        self.inner.metrics.inc_error_count(event);
        observability::record_handler_failure(event);
    }

    /// Republish an already counted failure on `"error"`.
    async fn publish_failure(&self, event: &EventName, id: ListenerId, failure: HandlerFailure) {
        if event.as_str() == ERROR_EVENT {
            error!(listener = %id, error = %failure, "Error listener failed");
            return;
        }

        warn!(event = %event, listener = %id, error = %failure, "Handler failed");

        let payload = ErrorEvent {
            event_name: event.clone(),
            error: failure.to_string(),
            handler: id.as_u64(),
            timestamp: Utc::now(),
        };
        let envelope = match serde_json::to_value(&payload) {
            Ok(value) => Envelope::new(value),
            Err(e) => {
                error!(event = %event, error = %e, "Failed to encode error event");
                return;
            }
        };

        let error_event = EventName::new(ERROR_EVENT);
        let (_, secondary) = self.fan_out(&error_event, envelope).await;
        for (listener, failure) in secondary {
            self.inner.metrics.inc_error_count(&error_event);
            observability::record_handler_failure(&error_event);
            error!(listener = %listener, error = %failure, "Error listener failed");
        }
    }

    // ===== Introspection =====

    /// Remove every listener of `event`, or of all events when `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        match event {
            Some(event) => {
                if let Some((name, _)) = self.inner.listeners.remove(event) {
                    self.inner.metrics.set_listener_count(&name, 0);
                }
            }
            None => {
                let names: Vec<EventName> = self
                    .inner
                    .listeners
                    .iter()
                    .map(|e| e.key().clone())
                    .collect();
                self.inner.listeners.clear();
                for name in &names {
                    self.inner.metrics.set_listener_count(name, 0);
                }
            }
        }
    }

    /// Events that currently have at least one listener, sorted by name
    pub fn event_names(&self) -> Vec<EventName> {
        let mut names: Vec<EventName> = self
            .inner
            .listeners
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names
    }

    pub fn listener_count(&self, event: impl AsRef<str>) -> usize {
        self.inner
            .listeners
            .get(event.as_ref())
            .map(|l| l.len())
            .unwrap_or(0)
    }

    pub fn has_listeners(&self, event: impl AsRef<str>) -> bool {
        self.listener_count(event) > 0
    }

    pub fn max_listeners(&self) -> usize {
        self.inner.max_listeners.load(Ordering::Relaxed)
    }

    /// Change the ceiling. Existing listeners above a lowered ceiling stay.
    pub fn set_max_listeners(&self, max: usize) {
        self.inner.max_listeners.store(max, Ordering::Relaxed);
    }

    /// Metrics for every event seen so far
    pub fn metrics(&self) -> HashMap<EventName, EventMetrics> {
        self.inner.metrics.snapshot()
    }

    pub fn event_metrics(&self, event: impl AsRef<str>) -> Option<EventMetrics> {
        self.inner.metrics.get(event.as_ref())
    }

    /// Reset counters. Listener counts are kept accurate.
    pub fn clear_metrics(&self) {
        self.inner.metrics.clear();
        for entry in self.inner.listeners.iter() {
            if !entry.value().is_empty() {
                self.inner
                    .metrics
                    .set_listener_count(entry.key(), entry.value().len());
            }
        }
    }

    /// Facade that prefixes every event name with `"<namespace>:"`.
    pub fn namespace(&self, namespace: impl Into<String>) -> Result<Namespace, BusError> {
        Namespace::new(self.clone(), namespace.into())
    }
}

/// Start one listener: its synchronous part runs here.
fn start_listener(
    listener: &ListenerEntry,
    envelope: Envelope,
) -> impl Future<Output = Settled> + Send + 'static {
    let id = listener.id;
    listener
        .handler
        .call_caught(envelope)
        .map(move |result| (id, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> Handler {
        let counter = Arc::clone(counter);
        Handler::sync(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn recording_handler(seen: &Arc<Mutex<Vec<Value>>>) -> Handler {
        let seen = Arc::clone(seen);
        Handler::sync(move |env| {
            seen.lock().unwrap().push(env.payload);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_emit_reaches_every_listener_despite_failures() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.on("job", counting_handler(&calls)).unwrap();
        bus.on("job", Handler::sync(|_| anyhow::bail!("boom"))).unwrap();
        bus.on("job", Handler::sync(|_| panic!("kaboom"))).unwrap();
        bus.on(
            "job",
            Handler::new(|_| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(anyhow::anyhow!("late failure"))
            }),
        )
        .unwrap();
        bus.on("job", counting_handler(&calls)).unwrap();

        let report = bus.emit("job", json!({"n": 1})).await.unwrap();

        assert_eq!(report.listeners, 5);
        assert_eq!(report.failures, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bus.event_metrics("job").unwrap().error_count, 3);
    }

    #[tokio::test]
    async fn test_fan_out_starts_all_before_awaiting() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            bus.on(
                "e",
                Handler::new(move |_| {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().unwrap().push(format!("start-{i}"));
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        order.lock().unwrap().push(format!("end-{i}"));
                        Ok(())
                    }
                }),
            )
            .unwrap();
        }

        bus.emit("e", json!(null)).await.unwrap();

        let order = order.lock().unwrap();
        assert_eq!(&order[..3], &["start-0", "start-1", "start-2"]);
        assert_eq!(order.len(), 6);
    }

    #[tokio::test]
    async fn test_once_runs_exactly_once() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.once("x", recording_handler(&seen)).unwrap();

        bus.emit("x", 1).await.unwrap();
        bus.emit("x", 2).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
        assert_eq!(bus.listener_count("x"), 0);
    }

    #[tokio::test]
    async fn test_once_is_removed_before_reentrant_emit() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_bus = bus.clone();
        let probe = Arc::clone(&calls);
        bus.once(
            "loop",
            Handler::new(move |_| {
                let bus = inner_bus.clone();
                let probe = Arc::clone(&probe);
                async move {
                    probe.fetch_add(1, Ordering::SeqCst);
                    bus.emit("loop", json!("again")).await?;
                    Ok(())
                }
            }),
        )
        .unwrap();

        bus.emit("loop", json!("first")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.event_metrics("loop").unwrap().emit_count, 2);
    }

    #[test]
    fn test_same_handler_registered_once() {
        let bus = EventBus::new();
        let h = Handler::sync(|_| Ok(()));

        let a = bus.on("e", h.clone()).unwrap();
        let b = bus.on("e", h.clone()).unwrap();

        assert_eq!(bus.listener_count("e"), 1);
        assert_eq!(a.listener_id(), b.listener_id());

        assert!(bus.off("e", &h));
        assert!(!bus.off("e", &h));
        assert_eq!(bus.listener_count("e"), 0);
    }

    #[tokio::test]
    async fn test_quota_rejects_without_touching_existing() {
        let bus = EventBus::builder().max_listeners(2).build();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.on("q", counting_handler(&calls)).unwrap();
        bus.on("q", counting_handler(&calls)).unwrap();
        let err = bus.on("q", counting_handler(&calls)).unwrap_err();

        assert_eq!(err, BusError::resource_exhausted("q", 2));
        assert_eq!(bus.listener_count("q"), 2);

        bus.emit("q", json!(null)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_event_name_is_rejected() {
        let bus = EventBus::new();
        assert!(matches!(
            bus.on("", Handler::sync(|_| Ok(()))),
            Err(BusError::Validation { .. })
        ));
        assert!(matches!(
            bus.emit("", json!(1)).await,
            Err(BusError::Validation { .. })
        ));
        assert!(bus.emit_sync("", json!(1)).is_err());
    }

    #[tokio::test]
    async fn test_failure_is_republished_on_error_event() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        bus.on(ERROR_EVENT, recording_handler(&errors)).unwrap();
        let failing = bus
            .on("user:created", Handler::sync(|_| anyhow::bail!("db down")))
            .unwrap();

        bus.emit("user:created", json!({"id": 1})).await.unwrap();

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["eventName"], json!("user:created"));
        assert_eq!(errors[0]["error"], json!("db down"));
        assert_eq!(
            errors[0]["handler"],
            json!(failing.listener_id().unwrap().as_u64())
        );
    }

    #[tokio::test]
    async fn test_failing_error_listener_is_not_reemitted() {
        let bus = EventBus::new();
        let error_calls = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&error_calls);
        bus.on(
            ERROR_EVENT,
            Handler::sync(move |_| {
                probe.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("error handler broken")
            }),
        )
        .unwrap();
        bus.on("e", Handler::sync(|_| anyhow::bail!("first"))).unwrap();

        bus.emit("e", json!(null)).await.unwrap();

        assert_eq!(error_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.event_metrics(ERROR_EVENT).unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_emit_sync_runs_sync_handlers_before_returning() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.on("s", counting_handler(&calls)).unwrap();

        let started = bus.emit_sync("s", json!(1)).unwrap();

        assert_eq!(started, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emit_sync_does_not_wait_for_deferred_work() {
        let bus = EventBus::new();
        let done = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&done);
        bus.on(
            "slow",
            Handler::new(move |_| {
                let probe = Arc::clone(&probe);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    probe.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .unwrap();

        bus.emit_sync("slow", json!(null)).unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emit_sync_counts_sync_failures_before_returning() {
        let bus = EventBus::new();
        let errors = Arc::new(AtomicUsize::new(0));
        bus.on(ERROR_EVENT, counting_handler(&errors)).unwrap();
        bus.on("bad", Handler::sync(|_| anyhow::bail!("sync failure")))
            .unwrap();

        bus.emit_sync("bad", json!(null)).unwrap();
        assert_eq!(bus.event_metrics("bad").unwrap().error_count, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(bus.event_metrics("bad").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_emit_sync_reports_deferred_failures() {
        let bus = EventBus::new();
        bus.on(
            "bad",
            Handler::new(|_| async {
                tokio::task::yield_now().await;
                Err(anyhow::anyhow!("deferred"))
            }),
        )
        .unwrap();

        bus.emit_sync("bad", json!(null)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(bus.event_metrics("bad").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_metrics_and_introspection() {
        let bus = EventBus::new();
        bus.on("b", Handler::sync(|_| Ok(()))).unwrap();
        bus.on("a", Handler::sync(|_| Ok(()))).unwrap();

        for _ in 0..3 {
            bus.emit("a", json!(null)).await.unwrap();
        }

        let names: Vec<String> = bus.event_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let a = bus.event_metrics("a").unwrap();
        assert_eq!(a.emit_count, 3);
        assert_eq!(a.error_count, 0);
        assert_eq!(a.listener_count, 1);

        bus.clear_metrics();
        let a = bus.event_metrics("a").unwrap();
        assert_eq!(a.emit_count, 0);
        assert_eq!(a.listener_count, 1);

        bus.remove_all_listeners(Some("a"));
        assert!(!bus.has_listeners("a"));
        assert!(bus.has_listeners("b"));

        bus.remove_all_listeners(None);
        assert!(bus.event_names().is_empty());
        assert_eq!(bus.event_metrics("b").unwrap().listener_count, 0);
    }

    #[tokio::test]
    async fn test_emit_without_listeners_still_counts() {
        let bus = EventBus::new();
        let report = bus.emit("nobody", json!(null)).await.unwrap();

        assert_eq!(report, EmitReport::default());
        assert!(report.is_clean());
        assert_eq!(bus.event_metrics("nobody").unwrap().emit_count, 1);
    }
}
