//! Handler - listener callable stored by the bus
//!
//! A handler takes an [`Envelope`] and returns a boxed future. Synchronous
//! work placed before the first `.await` of an `async move` block still runs
//! lazily, so handlers that must do synchronous work at call time should do
//! it in the closure body before building the future.

use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use crate::{Envelope, HandlerFailure};

/// Deferred completion of a handler invocation
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Shared handler callable. Identity is `Arc` pointer identity.
pub type HandlerFn = dyn Fn(Envelope) -> HandlerFuture + Send + Sync;

/// Cheap-to-clone listener
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Wrap an async closure.
    ///
    /// ```
    /// use contracts::Handler;
    ///
    /// let h = Handler::new(|env| async move {
    ///     println!("got {}", env.payload);
    ///     Ok(())
    /// });
    /// assert!(h.same(&h.clone()));
    /// ```
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |env: Envelope| -> HandlerFuture { Box::pin(f(env)) }))
    }

    /// Wrap a closure that already returns a boxed future.
    pub fn from_boxed<F>(f: F) -> Self
    where
        F: Fn(Envelope) -> HandlerFuture + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap a synchronous closure; it runs to completion at call time.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Envelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(move |env: Envelope| -> HandlerFuture {
            let result = f(env);
            Box::pin(std::future::ready(result))
        }))
    }

    /// Invoke the handler.
    #[inline]
    pub fn call(&self, envelope: Envelope) -> HandlerFuture {
        (self.0)(envelope)
    }

    /// Invoke the handler, turning errors and panics (in the call itself or
    /// in the returned future) into [`HandlerFailure`].
    ///
    /// The synchronous part of the handler runs before this returns.
    pub fn call_caught(
        &self,
        envelope: Envelope,
    ) -> impl Future<Output = Result<(), HandlerFailure>> + Send + 'static {
        let started = panic::catch_unwind(AssertUnwindSafe(|| self.call(envelope)));

        async move {
            match started {
                Err(payload) => Err(HandlerFailure::from_panic(payload)),
                Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(HandlerFailure::Error(e)),
                    Err(payload) => Err(HandlerFailure::from_panic(payload)),
                },
            }
        }
    }

    /// Pointer identity, used for dedup and `off`.
    #[inline]
    pub fn same(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_identity() {
        let a = Handler::sync(|_| Ok(()));
        let b = Handler::sync(|_| Ok(()));

        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }

    #[test]
    fn test_sync_handler_runs_at_call_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&calls);
        let h = Handler::sync(move |_| {
            probe.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        // Future is never polled, the side effect still happened
        let _fut = h.call(Envelope::new(json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_call_caught_converts_panics() {
        let h = Handler::sync(|env| {
            if env.payload == json!("boom") {
                panic!("exploded");
            }
            anyhow::bail!("plain error")
        });

        let panicked = h.call_caught(Envelope::new(json!("boom"))).now_or_never();
        assert!(matches!(
            panicked,
            Some(Err(HandlerFailure::Panic(ref msg))) if msg == "exploded"
        ));

        let failed = h.call_caught(Envelope::new(json!(1))).now_or_never();
        assert!(matches!(failed, Some(Err(HandlerFailure::Error(_)))));
    }
}
