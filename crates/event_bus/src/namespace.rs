//! Namespace - prefixing facade over a shared bus

use serde_json::Value;

use contracts::{BusError, Envelope, EventName, Handler, NAMESPACE_SEPARATOR};

use crate::bus::{EmitReport, EventBus};
use crate::subscription::Subscription;

/// View of an [`EventBus`] where every action `a` maps to `"<namespace>:a"`.
///
/// Registrations made here are ordinary bus registrations, visible to
/// anyone who addresses the full name.
#[derive(Clone)]
pub struct Namespace {
    bus: EventBus,
    prefix: String,
}

impl Namespace {
    pub(crate) fn new(bus: EventBus, prefix: String) -> Result<Self, BusError> {
        if prefix.is_empty() {
            return Err(BusError::validation("namespace must not be empty"));
        }
        Ok(Self { bus, prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full event name for `action`
    pub fn event_name(&self, action: impl AsRef<str>) -> Result<EventName, BusError> {
        let action = action.as_ref();
        if action.is_empty() {
            return Err(BusError::validation(format!(
                "action in namespace '{}' must not be empty",
                self.prefix
            )));
        }
        Ok(EventName::namespaced(&self.prefix, action))
    }

    pub fn on(&self, action: impl AsRef<str>, handler: Handler) -> Result<Subscription, BusError> {
        self.bus.on(self.event_name(action)?, handler)
    }

    pub fn once(
        &self,
        action: impl AsRef<str>,
        handler: Handler,
    ) -> Result<Subscription, BusError> {
        self.bus.once(self.event_name(action)?, handler)
    }

    pub fn off(&self, action: impl AsRef<str>, handler: &Handler) -> bool {
        match self.event_name(action) {
            Ok(name) => self.bus.off(name, handler),
            Err(_) => false,
        }
    }

    pub async fn emit(
        &self,
        action: impl AsRef<str>,
        payload: impl Into<Value>,
    ) -> Result<EmitReport, BusError> {
        self.bus.emit(self.event_name(action)?, payload).await
    }

    pub async fn emit_envelope(
        &self,
        action: impl AsRef<str>,
        envelope: Envelope,
    ) -> Result<EmitReport, BusError> {
        self.bus.emit_envelope(self.event_name(action)?, envelope).await
    }

    pub fn emit_sync(
        &self,
        action: impl AsRef<str>,
        payload: impl Into<Value>,
    ) -> Result<usize, BusError> {
        self.bus.emit_sync(self.event_name(action)?, payload)
    }

    /// Remove listeners of one action, or of every event in this namespace.
    pub fn remove_all_listeners(&self, action: Option<&str>) {
        match action {
            Some(action) => {
                if let Ok(name) = self.event_name(action) {
                    self.bus.remove_all_listeners(Some(name.as_str()));
                }
            }
            None => {
                let scope = format!("{}{}", self.prefix, NAMESPACE_SEPARATOR);
                for name in self.bus.event_names() {
                    if name.starts_with(&scope) {
                        self.bus.remove_all_listeners(Some(name.as_str()));
                    }
                }
            }
        }
    }

    pub fn listener_count(&self, action: impl AsRef<str>) -> usize {
        self.event_name(action)
            .map(|name| self.bus.listener_count(name))
            .unwrap_or(0)
    }

    pub fn has_listeners(&self, action: impl AsRef<str>) -> bool {
        self.listener_count(action) > 0
    }

    /// Underlying bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_namespace_prefixes_event_names() {
        let bus = EventBus::new();
        let users = bus.namespace("user").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let probe = Arc::clone(&seen);
        users
            .on(
                "created",
                Handler::sync(move |env| {
                    probe.lock().unwrap().push(env.payload);
                    Ok(())
                }),
            )
            .unwrap();

        assert!(bus.has_listeners("user:created"));
        assert!(users.has_listeners("created"));

        bus.emit("user:created", json!({"id": 1})).await.unwrap();
        users.emit("created", json!({"id": 2})).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!({"id": 1}), json!({"id": 2})]
        );
    }

    #[test]
    fn test_empty_namespace_and_action_rejected() {
        let bus = EventBus::new();
        assert!(matches!(
            bus.namespace(""),
            Err(BusError::Validation { .. })
        ));

        let ns = bus.namespace("order").unwrap();
        assert!(ns.on("", Handler::sync(|_| Ok(()))).is_err());
        assert!(ns.emit_sync("", json!(null)).is_err());
    }

    #[test]
    fn test_remove_all_scoped_to_namespace() {
        let bus = EventBus::new();
        let ns = bus.namespace("order").unwrap();

        ns.on("placed", Handler::sync(|_| Ok(()))).unwrap();
        ns.on("shipped", Handler::sync(|_| Ok(()))).unwrap();
        bus.on("orderly", Handler::sync(|_| Ok(()))).unwrap();

        ns.remove_all_listeners(None);

        assert!(!bus.has_listeners("order:placed"));
        assert!(!bus.has_listeners("order:shipped"));
        assert!(bus.has_listeners("orderly"));
    }
}
