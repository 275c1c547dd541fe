//! `run` command implementation.
//!
//! Wires a bus, a publisher and a subscriber from the configuration, then
//! publishes a stream of `demo:tick` events at a handler that fails on every
//! k-th tick. The summary shows how the configured retry and dead-letter
//! settings played out.

use anyhow::{Context, Result};
use contracts::{backoff_delay, BatchEvent, BusBlueprint, Envelope, Handler, PublishOptions};
use event_bus::{EventBus, EventMetrics};
use publisher::{Publisher, PublisherStats};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use subscriber::{SubscribeOptions, Subscriber};
use tracing::{debug, info, warn};

use crate::cli::RunArgs;

const DEMO_EVENT: &str = "demo:tick";

/// Summary printed at the end of a run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    events: u64,
    publish_errors: u64,
    processed: u64,
    handler_errors: u64,
    dead_letters: u64,
    duration_ms: u64,
    interrupted: bool,
    publisher: PublisherStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    bus: Option<EventMetrics>,
}

/// Execute the `run` command
pub async fn run_demo(args: &RunArgs) -> Result<()> {
    let blueprint = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration given, using defaults");
            BusBlueprint::default()
        }
    };

    let bus = EventBus::from_config(&blueprint.bus);
    let publisher = Publisher::new(bus.clone(), blueprint.publisher.clone());
    let subscriber = Subscriber::new(bus.clone(), blueprint.subscriber.clone());

    let dead_letters = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&dead_letters);
    bus.on(
        &blueprint.subscriber.dead_letter_event,
        Handler::sync(move |env: Envelope| {
            counter.fetch_add(1, Ordering::Relaxed);
            warn!(payload = %env.payload, "Dead letter received");
            Ok(())
        }),
    )?;

    subscriber.subscribe(SubscribeOptions::new(
        DEMO_EVENT,
        flaky_handler(args.fail_every),
    ))?;
    if blueprint.publisher.enable_batching {
        subscriber.subscribe(SubscribeOptions::new(
            format!("{DEMO_EVENT}:batch"),
            flaky_batch_handler(args.fail_every),
        ))?;
    }
    subscriber.start();

    info!(
        events = args.events,
        fail_every = args.fail_every,
        batching = blueprint.publisher.enable_batching,
        strategy = ?blueprint.subscriber.error_strategy,
        "Starting demo workload"
    );

    let started = Instant::now();
    let shutdown_signal = setup_shutdown_signal();
    tokio::pin!(shutdown_signal);

    let mut publish_errors = 0;
    let mut interrupted = false;
    for seq in 1..=args.events {
        let publish = publisher.publish(
            DEMO_EVENT,
            json!({ "seq": seq }),
            PublishOptions::new().with_retry(None),
        );
        tokio::select! {
            result = publish => {
                if let Err(e) = result {
                    publish_errors += 1;
                    debug!(seq, error = %e, "Publish reported a failure");
                }
            }
            _ = &mut shutdown_signal => {
                warn!("Received shutdown signal, stopping workload...");
                interrupted = true;
                break;
            }
        }
        if args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    if !interrupted {
        publisher.flush().await;
        let settle = settle_time(&blueprint);
        info!(settle_ms = settle.as_millis() as u64, "Waiting for retries to settle");
        tokio::select! {
            _ = tokio::time::sleep(settle) => {}
            _ = &mut shutdown_signal => {
                warn!("Received shutdown signal, skipping settle phase");
                interrupted = true;
            }
        }
    }

    subscriber.stop();
    publisher.destroy();

    let (processed, handler_errors) = subscriber
        .metrics()
        .values()
        .fold((0, 0), |(p, e), m| (p + m.processed, e + m.errors));

    let summary = RunSummary {
        events: args.events,
        publish_errors,
        processed,
        handler_errors,
        dead_letters: dead_letters.load(Ordering::Relaxed),
        duration_ms: started.elapsed().as_millis() as u64,
        interrupted,
        publisher: publisher.stats(),
        bus: bus.event_metrics(DEMO_EVENT),
    };

    if args.json {
        let json =
            serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?;
        println!("{}", json);
    } else {
        print_summary(&summary);
    }

    info!("Event bus demo finished");
    Ok(())
}

fn should_fail(seq: u64, fail_every: u64) -> bool {
    fail_every > 0 && seq % fail_every == 0
}

fn flaky_handler(fail_every: u64) -> Handler {
    Handler::sync(move |env: Envelope| {
        let seq = env.payload["seq"].as_u64().unwrap_or_default();
        if should_fail(seq, fail_every) {
            anyhow::bail!("tick {seq} rejected");
        }
        debug!(seq, "Tick handled");
        Ok(())
    })
}

fn flaky_batch_handler(fail_every: u64) -> Handler {
    Handler::sync(move |env: Envelope| {
        let batch: BatchEvent = serde_json::from_value(env.payload)?;
        for item in &batch.events {
            let seq = item.data["seq"].as_u64().unwrap_or_default();
            if should_fail(seq, fail_every) {
                anyhow::bail!("batch rejected at tick {seq}");
            }
        }
        debug!(count = batch.count, "Tick batch handled");
        Ok(())
    })
}

/// Upper bound on how long the slowest retry chain takes to finish
fn settle_time(blueprint: &BusBlueprint) -> Duration {
    let chain = |base: Duration, retries: u32| -> Duration {
        (1..=retries).map(|n| backoff_delay(base, n)).sum()
    };
    let subscriber = chain(
        blueprint.subscriber.retry_base_delay(),
        blueprint.subscriber.max_retries,
    );
    let publisher = chain(
        blueprint.publisher.retry_base_delay(),
        blueprint.publisher.max_retries,
    );
    subscriber.max(publisher) + Duration::from_millis(200)
}

/// Resolve on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                      Demo Run Summary                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📊 Overview");
    println!("   ├─ Duration: {} ms", summary.duration_ms);
    println!("   ├─ Events published: {}", summary.events);
    println!("   ├─ Publish errors: {}", summary.publish_errors);
    println!("   └─ Interrupted: {}", summary.interrupted);

    println!("\n📥 Subscriber");
    println!("   ├─ Processed: {}", summary.processed);
    println!("   ├─ Handler errors: {}", summary.handler_errors);
    println!("   └─ Dead letters: {}", summary.dead_letters);

    let stats = &summary.publisher;
    println!("\n📤 Publisher");
    println!("   ├─ Published: {}", stats.published);
    println!("   ├─ Failed: {}", stats.failed);
    println!("   ├─ Batches flushed: {}", stats.batches_flushed);
    println!(
        "   └─ Retries: {} scheduled, {} succeeded, {} exhausted",
        stats.retries_scheduled, stats.retries_succeeded, stats.retries_exhausted
    );

    if let Some(ref bus) = summary.bus {
        println!("\n📡 Bus ({DEMO_EVENT})");
        println!("   ├─ Emits: {}", bus.emit_count);
        println!("   ├─ Listeners: {}", bus.listener_count);
        println!("   └─ Handler errors: {}", bus.error_count);
    }

    println!();
}
