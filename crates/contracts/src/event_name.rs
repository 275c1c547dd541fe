//! EventName - Cheap-to-clone event identifier
//!
//! Uses Arc<str> internally for O(1) clone operations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::BusError;

/// Separator between a namespace and an action (`"user:created"`).
pub const NAMESPACE_SEPARATOR: char = ':';

/// Event name with cheap cloning.
///
/// Event names are routed by exact string equality. The `namespace:action`
/// convention is used by [`EventName::namespaced`] and by the derived names
/// (`<event>:batch`, `<event>:ack`, `<event>:retry`).
///
/// # Examples
/// ```
/// use contracts::EventName;
///
/// let name: EventName = "user:created".into();
/// let copy = name.clone();  // O(1) - just increments ref count
/// assert_eq!(name, copy);
/// assert_eq!(name.ack().as_str(), "user:created:ack");
/// ```
#[derive(Clone)]
pub struct EventName(Arc<str>);

impl EventName {
    /// Create a new EventName from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Create an EventName, rejecting the empty string.
    pub fn parse(s: impl AsRef<str>) -> Result<Self, BusError> {
        let s = s.as_ref();
        if s.is_empty() {
            return Err(BusError::validation("event name cannot be empty"));
        }
        Ok(Self::new(s))
    }

    /// Join a namespace and an action: `namespaced("user", "created")` -> `user:created`.
    pub fn namespaced(namespace: &str, action: &str) -> Self {
        Self::from(format!("{namespace}{NAMESPACE_SEPARATOR}{action}"))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<event>:batch`
    pub fn batch(&self) -> Self {
        self.suffixed("batch")
    }

    /// `<event>:ack`
    pub fn ack(&self) -> Self {
        self.suffixed("ack")
    }

    /// `<event>:retry`
    pub fn retry(&self) -> Self {
        self.suffixed("retry")
    }

    fn suffixed(&self, suffix: &str) -> Self {
        Self::namespaced(&self.0, suffix)
    }
}

impl Deref for EventName {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for EventName {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EventName {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventName {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for EventName {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&String> for EventName {
    #[inline]
    fn from(s: &String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

impl From<&EventName> for EventName {
    #[inline]
    fn from(s: &EventName) -> Self {
        s.clone()
    }
}

/// The empty name; rejected by every bus operation.
impl Default for EventName {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventName({:?})", self.0)
    }
}

impl PartialEq for EventName {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for EventName {}

impl PartialEq<str> for EventName {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for EventName {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialEq<String> for EventName {
    #[inline]
    fn eq(&self, other: &String) -> bool {
        self.0.as_ref() == other
    }
}

// Hash - same as str hash for HashMap compatibility
impl Hash for EventName {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for EventName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
