//! SubscriptionPlan - declare subscriptions up front, apply them in one call

use contracts::{BusError, Handler};
use event_bus::Subscription;

use crate::options::SubscribeOptions;
use crate::subscriber::Subscriber;

/// Ordered list of subscriptions to make on a [`Subscriber`].
///
/// ```
/// use contracts::Handler;
/// use event_bus::EventBus;
/// use subscriber::{Subscriber, SubscriptionPlan};
///
/// let bus = EventBus::new();
/// let sub = Subscriber::with_id(bus.clone(), "billing");
///
/// let handle = SubscriptionPlan::new()
///     .on("invoice:created", Handler::sync(|_| Ok(())))
///     .on("invoice:paid", Handler::sync(|_| Ok(())))
///     .apply(&sub)
///     .unwrap();
///
/// assert_eq!(handle.events().len(), 2);
/// assert!(bus.has_listeners("invoice:paid"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPlan {
    entries: Vec<SubscribeOptions>,
}

impl SubscriptionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, options: SubscribeOptions) -> Self {
        self.entries.push(options);
        self
    }

    /// Plain subscription with default options
    pub fn on(self, event: impl Into<String>, handler: Handler) -> Self {
        self.add(SubscribeOptions::new(event, handler))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Subscribe every entry in order. On the first rejection the entries
    /// already applied are unsubscribed and the error is returned.
    pub fn apply(&self, subscriber: &Subscriber) -> Result<Subscription, BusError> {
        let mut applied = Vec::with_capacity(self.entries.len());
        for options in &self.entries {
            match subscriber.subscribe(options.clone()) {
                Ok(subscription) => applied.push(subscription),
                Err(e) => {
                    for subscription in &applied {
                        subscription.unsubscribe();
                    }
                    return Err(e);
                }
            }
        }
        Ok(Subscription::group(applied))
    }
}
