//! SubscribeOptions - one subscription's configuration

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use contracts::{ErrorStrategy, EventName, Handler};

/// Payload predicate; `false` drops the event silently
pub type Filter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Payload rewrite applied before the handler runs
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Configuration of a single subscription.
///
/// ```
/// use contracts::{ErrorStrategy, Handler};
/// use subscriber::SubscribeOptions;
///
/// let opts = SubscribeOptions::new("order:placed", Handler::sync(|_| Ok(())))
///     .filter(|p| p["total"].as_f64().unwrap_or(0.0) > 100.0)
///     .error_strategy(ErrorStrategy::DeadLetter);
/// assert_eq!(opts.event, "order:placed");
/// ```
#[derive(Clone)]
pub struct SubscribeOptions {
    pub event: String,
    pub handler: Handler,
    pub once: bool,
    pub filter: Option<Filter>,
    pub transform: Option<Transform>,
    /// Shorthand for `error_strategy(ErrorStrategy::Retry)`
    pub retry: bool,
    /// Overrides the subscriber's configured max retries
    pub max_retries: Option<u32>,
    /// Overrides the subscriber's dead-letter event
    pub dead_letter_event: Option<EventName>,
    /// Overrides the subscriber's default strategy
    pub error_strategy: Option<ErrorStrategy>,
}

impl SubscribeOptions {
    pub fn new(event: impl Into<String>, handler: Handler) -> Self {
        Self {
            event: event.into(),
            handler,
            once: false,
            filter: None,
            transform: None,
            retry: false,
            max_retries: None,
            dead_letter_event: None,
            error_strategy: None,
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn filter(mut self, filter: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn transform(mut self, transform: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn retry(mut self, max_retries: Option<u32>) -> Self {
        self.retry = true;
        self.max_retries = max_retries;
        self
    }

    pub fn dead_letter_event(mut self, event: impl Into<EventName>) -> Self {
        self.dead_letter_event = Some(event.into());
        self
    }

    pub fn error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = Some(strategy);
        self
    }

    /// Strategy in effect given the subscriber's default.
    pub fn effective_strategy(&self, default: ErrorStrategy) -> ErrorStrategy {
        match (self.error_strategy, self.retry) {
            (Some(strategy), _) => strategy,
            (None, true) => ErrorStrategy::Retry,
            (None, false) => default,
        }
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("event", &self.event)
            .field("once", &self.once)
            .field("filter", &self.filter.is_some())
            .field("transform", &self.transform.is_some())
            .field("retry", &self.retry)
            .field("max_retries", &self.max_retries)
            .field("dead_letter_event", &self.dead_letter_event)
            .field("error_strategy", &self.error_strategy)
            .finish()
    }
}
