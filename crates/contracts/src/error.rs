//! Layered error definitions
//!
//! Only usage errors surface synchronously to callers. Handler failures are
//! captured as [`HandlerFailure`] values and turned into events/metrics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified bus error type
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// Bad argument at the call site (empty event name, empty namespace, bad pattern)
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Listener ceiling reached for an event
    #[error("max listeners ({max}) reached for event '{event}'")]
    ResourceExhausted { event: String, max: usize },
}

impl BusError {
    /// Create validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create resource exhausted error
    pub fn resource_exhausted(event: impl Into<String>, max: usize) -> Self {
        Self::ResourceExhausted {
            event: event.into(),
            max,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration parse error
    #[error("config parse error: {message}")]
    Parse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    Validation { field: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create configuration parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A listener that returned an error or panicked while handling an event.
#[derive(Debug)]
pub enum HandlerFailure {
    /// The handler (or its deferred completion) returned `Err`
    Error(anyhow::Error),
    /// The handler panicked; the panic message if one could be extracted
    Panic(String),
}

impl HandlerFailure {
    /// Build from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::Panic(message)
    }

    /// Short error class, used as `error.name` in dead-letter payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Error(_) => "HandlerError",
            Self::Panic(_) => "HandlerPanic",
        }
    }

    /// Serializable description of the failure.
    pub fn info(&self) -> ErrorInfo {
        match self {
            Self::Error(e) => ErrorInfo {
                message: e.to_string(),
                // Debug output of anyhow includes the cause chain
                stack: Some(format!("{e:?}")),
                name: self.name().to_string(),
            },
            Self::Panic(msg) => ErrorInfo {
                message: msg.clone(),
                stack: None,
                name: self.name().to_string(),
            },
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Panic(msg) => write!(f, "handler panicked: {msg}"),
        }
    }
}

impl From<anyhow::Error> for HandlerFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Error(err)
    }
}

/// Serializable error description `{message, stack, name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    pub name: String,
}
