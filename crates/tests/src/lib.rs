//! # Integration Tests
//!
//! 跨 crate 的集成测试与端到端测试。
//!
//! 负责：
//! - 分发引擎的行为保证（fan-out、once、配额、指标）
//! - Publisher → Bus → Subscriber 的完整链路
//! - 配置加载到运行时组件的装配

#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};

    use contracts::{Envelope, Handler};
    use event_bus::EventBus;

    pub type Seen = Arc<Mutex<Vec<Envelope>>>;

    /// Handler that records every envelope it receives
    pub fn recording() -> (Handler, Seen) {
        let seen: Seen = Arc::default();
        let probe = Arc::clone(&seen);
        let handler = Handler::sync(move |env| {
            probe.lock().unwrap().push(env);
            Ok(())
        });
        (handler, seen)
    }

    pub fn record_on(bus: &EventBus, event: &str) -> Seen {
        let (handler, seen) = recording();
        bus.on(event, handler).unwrap();
        seen
    }

    pub fn always_failing() -> Handler {
        Handler::sync(|_| anyhow::bail!("always fails"))
    }
}

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }
}

#[cfg(test)]
mod dispatch_tests {
    use contracts::BusError;
    use event_bus::{EventBus, Handler};
    use serde_json::json;

    use crate::support::{always_failing, record_on, recording};

    #[tokio::test]
    async fn test_fan_out_survives_failing_listener() {
        let bus = EventBus::new();
        let first = record_on(&bus, "order:placed");
        bus.on("order:placed", always_failing()).unwrap();
        let last = record_on(&bus, "order:placed");
        let errors = record_on(&bus, "error");

        let report = bus.emit("order:placed", json!({"id": 7})).await.unwrap();

        assert_eq!(report.listeners, 3);
        assert_eq!(report.failures, 1);
        assert_eq!(first.lock().unwrap()[0].payload, json!({"id": 7}));
        assert_eq!(last.lock().unwrap()[0].payload, json!({"id": 7}));
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(bus.event_metrics("order:placed").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_user_created_is_counted() {
        let bus = EventBus::new();
        let seen = record_on(&bus, "user:created");

        bus.emit("user:created", json!({"id": 1})).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload, json!({"id": 1}));
        assert_eq!(bus.event_metrics("user:created").unwrap().emit_count, 1);
    }

    #[tokio::test]
    async fn test_once_listener_fires_for_first_emit_only() {
        let bus = EventBus::new();
        let (handler, seen) = recording();
        bus.once("x", handler).unwrap();

        bus.emit("x", 1).await.unwrap();
        bus.emit("x", 2).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload, json!(1));
        assert!(!bus.has_listeners("x"));
    }

    #[tokio::test]
    async fn test_unsubscribe_twice_is_harmless() {
        let bus = EventBus::new();
        let (handler, seen) = recording();
        let subscription = bus.on("tick", handler).unwrap();

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());

        bus.emit("tick", 1).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bus.listener_count("tick"), 0);
    }

    #[tokio::test]
    async fn test_listener_quota_keeps_existing_handlers() {
        let bus = EventBus::new();
        assert_eq!(bus.max_listeners(), 100);

        let seen = record_on(&bus, "y");
        for _ in 1..100 {
            bus.on("y", Handler::sync(|_| Ok(()))).unwrap();
        }

        let err = bus.on("y", Handler::sync(|_| Ok(()))).unwrap_err();
        assert!(matches!(err, BusError::ResourceExhausted { .. }));
        assert_eq!(bus.listener_count("y"), 100);

        let report = bus.emit("y", json!("still here")).await.unwrap();
        assert_eq!(report.listeners, 100);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clean_emits_are_counted_exactly() {
        let bus = EventBus::new();
        bus.on("metric", Handler::sync(|_| Ok(()))).unwrap();

        for i in 0..25 {
            bus.emit("metric", i).await.unwrap();
        }

        let metrics = bus.event_metrics("metric").unwrap();
        assert_eq!(metrics.emit_count, 25);
        assert_eq!(metrics.error_count, 0);
        assert_eq!(metrics.listener_count, 1);
        assert!(metrics.last_emitted.is_some());
    }

    #[tokio::test]
    async fn test_namespace_scopes_events() {
        let bus = EventBus::new();
        let users = bus.namespace("users").unwrap();
        let seen = record_on(&bus, "users:created");
        users.on("deleted", Handler::sync(|_| Ok(()))).unwrap();

        users.emit("created", json!({"id": 3})).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);

        users.remove_all_listeners(None);
        assert!(bus.event_names().is_empty());
    }
}

#[cfg(test)]
mod publish_tests {
    use std::time::Duration;

    use contracts::{BatchEvent, Handler, PublishOptions, PublisherConfig, SubscriberConfig};
    use event_bus::EventBus;
    use publisher::Publisher;
    use serde_json::json;
    use subscriber::{SubscribeOptions, Subscriber};
    use tokio::time::Instant;

    use crate::support::record_on;

    #[tokio::test(start_paused = true)]
    async fn test_delayed_publish_waits_for_listeners() {
        let bus = EventBus::new();
        let seen = record_on(&bus, "e");
        let publisher = Publisher::with_defaults(bus.clone());

        let started = Instant::now();
        let receipt = publisher
            .publish(
                "e",
                json!({"k": "v"}),
                PublishOptions::new().with_delay(Duration::from_millis(50)),
            )
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(receipt.listeners, 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_flushes_without_timer() {
        let bus = EventBus::new();
        let batches = record_on(&bus, "metric:batch");
        let plain = record_on(&bus, "metric");
        let publisher = Publisher::new(
            bus.clone(),
            PublisherConfig {
                enable_batching: true,
                batch_size: 3,
                batch_timeout_ms: 60_000,
                ..PublisherConfig::default()
            },
        );

        let started = Instant::now();
        let (a, b, c) = tokio::join!(
            publisher.publish("metric", json!(1), PublishOptions::new()),
            publisher.publish("metric", json!(2), PublishOptions::new()),
            publisher.publish("metric", json!(3), PublishOptions::new()),
        );
        assert!(a.unwrap().batched && b.is_ok() && c.is_ok());
        assert!(started.elapsed() < Duration::from_secs(60));

        assert!(plain.lock().unwrap().is_empty());
        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let batch: BatchEvent = serde_json::from_value(batches[0].payload.clone()).unwrap();
        assert_eq!(batch.count, 3);
        let data: Vec<_> = batch.events.iter().map(|item| item.data.clone()).collect();
        assert_eq!(data, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_publish_with_ack_collects_subscriber_ack() {
        let bus = EventBus::new();
        let publisher = Publisher::with_defaults(bus.clone());
        let subscriber = Subscriber::new(bus.clone(), SubscriberConfig::default().with_id("billing"));
        subscriber.start();
        subscriber
            .subscribe(SubscribeOptions::new("invoice", Handler::sync(|_| Ok(()))))
            .unwrap();

        let outcome = publisher
            .publish_with_ack("invoice", json!({"total": 12}), Some(Duration::from_secs(1)))
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert!(outcome.all_succeeded());
        assert_eq!(outcome.acks.len(), 1);
        assert_eq!(outcome.acks[0].subscriber, "billing");
        assert!(!bus.has_listeners("invoice:ack"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publisher_retry_recovers_after_listener_heals() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let bus = EventBus::new();
        let recovered = record_on(&bus, contracts::PUBLISHER_RETRY_SUCCESS);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        bus.on(
            "sync",
            Handler::sync(move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("first attempt fails");
                }
                Ok(())
            }),
        )
        .unwrap();
        let publisher = Publisher::new(
            bus.clone(),
            PublisherConfig {
                retry_base_delay_ms: 100,
                ..PublisherConfig::default()
            },
        );

        let err = publisher
            .publish("sync", json!(1), PublishOptions::new().with_retry(Some(2)))
            .await
            .unwrap_err();
        assert!(err.is_retry_scheduled());

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(recovered.lock().unwrap().len(), 1);
        assert_eq!(publisher.stats().retries_succeeded, 1);
    }
}

#[cfg(test)]
mod subscriber_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ErrorStrategy, PublishOptions, SubscriberConfig, DEAD_LETTER_EVENT};
    use event_bus::EventBus;
    use publisher::Publisher;
    use serde_json::json;
    use subscriber::{SubscribeOptions, Subscriber};

    use crate::support::{always_failing, record_on};

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_dead_letter() {
        let bus = EventBus::new();
        let retries = record_on(&bus, "job:retry");
        let dead = record_on(&bus, DEAD_LETTER_EVENT);
        let subscriber = Subscriber::new(
            bus.clone(),
            SubscriberConfig {
                error_strategy: ErrorStrategy::Retry,
                max_retries: 2,
                retry_base_delay_ms: 50,
                ..SubscriberConfig::default()
            },
        );
        subscriber.start();
        subscriber
            .subscribe(SubscribeOptions::new("job", always_failing()))
            .unwrap();

        bus.emit("job", json!({"n": 1})).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let counts: Vec<u32> = retries
            .lock()
            .unwrap()
            .iter()
            .map(|env| env.metadata.retry_count)
            .collect();
        assert_eq!(counts, vec![1, 2]);

        let dead = dead.lock().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload["originalEvent"], json!("job"));
        assert_eq!(dead[0].payload["data"], json!({"n": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blueprint_wires_full_pipeline() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
[bus]
max_listeners = 10

[publisher]
enable_batching = false

[subscriber]
id = "audit"
error_strategy = "dead_letter"
dead_letter_event = "audit:dlq"
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let bus = EventBus::from_config(&blueprint.bus);
        assert_eq!(bus.max_listeners(), 10);
        let dlq = record_on(&bus, "audit:dlq");
        let publisher = Publisher::new(bus.clone(), blueprint.publisher.clone());
        let subscriber = Subscriber::new(bus.clone(), blueprint.subscriber.clone());
        subscriber.start();
        subscriber
            .subscribe(
                SubscribeOptions::new("audit:entry", always_failing())
                    .filter(|payload| payload["level"] == json!("high")),
            )
            .unwrap();

        for level in ["low", "high", "low"] {
            publisher
                .publish("audit:entry", json!({"level": level}), PublishOptions::new())
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let dlq = dlq.lock().unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].payload["subscriberId"], json!("audit"));
        assert_eq!(subscriber.event_metrics("audit:entry").unwrap().errors, 1);
        assert_eq!(publisher.stats().published, 3);
    }
}
