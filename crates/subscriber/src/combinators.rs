//! Handler combinators: throttle and debounce

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{trace, warn};

use contracts::{Envelope, Handler, HandlerFuture};

/// Pass an invocation through only if at least `interval` has elapsed since
/// the last one passed; the rest are dropped.
pub fn throttle(handler: Handler, interval: Duration) -> Handler {
    let last: Mutex<Option<Instant>> = Mutex::new(None);

    Handler::from_boxed(move |env: Envelope| -> HandlerFuture {
        let now = Instant::now();
        let accepted = {
            let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
            match *last {
                Some(prev) if now.duration_since(prev) < interval => false,
                _ => {
                    *last = Some(now);
                    true
                }
            }
        };

        if accepted {
            handler.call(env)
        } else {
            trace!("Throttled invocation dropped");
            Box::pin(std::future::ready(Ok(())))
        }
    })
}

/// Collapse bursts: each invocation restarts a `quiet` timer and only the
/// last payload of a burst reaches `handler`, once the timer elapses.
///
/// Returns immediately; the delayed call runs on the tokio runtime and its
/// failures are logged.
pub fn debounce(handler: Handler, quiet: Duration) -> Handler {
    let generation = Arc::new(AtomicU64::new(0));

    Handler::from_boxed(move |env: Envelope| -> HandlerFuture {
        let ticket = generation.fetch_add(1, Ordering::AcqRel) + 1;
        let generation = Arc::clone(&generation);
        let handler = handler.clone();

        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            if generation.load(Ordering::Acquire) != ticket {
                trace!("Debounced invocation superseded");
                return;
            }
            if let Err(e) = handler.call_caught(env).await {
                warn!(error = %e, "Debounced handler failed");
            }
        });

        Box::pin(std::future::ready(Ok(())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn recorder() -> (Handler, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let probe = Arc::clone(&seen);
        let handler = Handler::sync(move |env| {
            probe.lock().unwrap().push(env.payload);
            Ok(())
        });
        (handler, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_drops_within_interval() {
        let (inner, seen) = recorder();
        let throttled = throttle(inner, Duration::from_millis(100));

        throttled.call(Envelope::new(json!(1))).await.unwrap();
        throttled.call(Envelope::new(json!(2))).await.unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        throttled.call(Envelope::new(json!(3))).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_delivers_last_of_burst() {
        let (inner, seen) = recorder();
        let debounced = debounce(inner, Duration::from_millis(50));

        for i in 0..5 {
            debounced.call(Envelope::new(json!(i))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock().unwrap(), vec![json!(4)]);

        debounced.call(Envelope::new(json!("next"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
