//! Subscription - handle returned by every registration

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use contracts::EventName;

use crate::bus::BusInner;

/// Registry id of a single listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Handle to one registration, or to a group of registrations.
///
/// Cloning shares the handle. `unsubscribe` is idempotent: only the first
/// call on any clone removes anything. The handle holds the bus weakly and
/// does not keep it alive.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    target: Target,
    active: AtomicBool,
}

enum Target {
    Listener {
        bus: Weak<BusInner>,
        event: EventName,
        id: ListenerId,
    },
    Group(Vec<Subscription>),
}

impl Subscription {
    pub(crate) fn listener(bus: Weak<BusInner>, event: EventName, id: ListenerId) -> Self {
        Self::from_target(Target::Listener { bus, event, id })
    }

    /// Combine several subscriptions into one handle.
    pub fn group(members: Vec<Subscription>) -> Self {
        Self::from_target(Target::Group(members))
    }

    fn from_target(target: Target) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                target,
                active: AtomicBool::new(true),
            }),
        }
    }

    /// Remove the registration(s). Returns `true` if this call changed anything.
    pub fn unsubscribe(&self) -> bool {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return false;
        }

        match &self.inner.target {
            Target::Listener { bus, event, id } => match bus.upgrade() {
                Some(bus) => {
                    let removed = bus.remove_listener_by_id(event, *id);
                    debug!(event = %event, listener = %id, removed, "Unsubscribed");
                    removed
                }
                None => false,
            },
            Target::Group(members) => members
                .iter()
                .fold(false, |changed, m| m.unsubscribe() || changed),
        }
    }

    /// `false` once `unsubscribe` has been called on any clone.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Event name for a single-listener handle
    pub fn event(&self) -> Option<&EventName> {
        match &self.inner.target {
            Target::Listener { event, .. } => Some(event),
            Target::Group(_) => None,
        }
    }

    /// Listener id for a single-listener handle
    pub fn listener_id(&self) -> Option<ListenerId> {
        match &self.inner.target {
            Target::Listener { id, .. } => Some(*id),
            Target::Group(_) => None,
        }
    }

    /// Event names covered by this handle
    pub fn events(&self) -> Vec<EventName> {
        match &self.inner.target {
            Target::Listener { event, .. } => vec![event.clone()],
            Target::Group(members) => members.iter().flat_map(|m| m.events()).collect(),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("events", &self.events())
            .field("active", &self.is_active())
            .finish()
    }
}
