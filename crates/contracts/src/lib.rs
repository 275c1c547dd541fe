//! # Contracts
//!
//! Shared types for the event bus crates: event names, envelopes, handler
//! callables, reserved payload shapes, per-call options and configuration.
//! `event_bus`, `publisher` and `subscriber` only talk to each other through
//! these types.
//!
//! ## Payload Model
//! - Payloads are `serde_json::Value`
//! - Delivery metadata travels in [`EnvelopeMeta`], never inside the payload

mod config;
mod envelope;
mod error;
mod event_name;
mod events;
mod handler;
mod options;

pub use config::*;
pub use envelope::*;
pub use error::*;
pub use event_name::{EventName, NAMESPACE_SEPARATOR};
pub use events::*;
pub use handler::*;
pub use options::*;
