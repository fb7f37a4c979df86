//! Core event types for the a3s-dispatch system
//!
//! All types use camelCase JSON serialization for wire compatibility.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single dispatched event
///
/// Handlers receive the event by reference (sync) or by value (detached).
/// The payload is arbitrary JSON so producers in any subsystem can emit
/// without sharing Rust types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique event identifier (evt-<uuid>)
    pub id: String,

    /// Event name this was emitted under
    pub name: String,

    /// Event payload — arbitrary JSON data
    pub payload: serde_json::Value,

    /// Resolved dispatch priority (lower is more urgent)
    pub priority: u32,

    /// Unix timestamp in milliseconds
    pub timestamp: u64,

    /// Optional key-value metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Event {
    /// Create a new event with auto-generated id and timestamp
    pub fn new(name: impl Into<String>, payload: serde_json::Value, priority: u32) -> Self {
        Self {
            id: format!("evt-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            payload,
            priority,
            timestamp: now_millis(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
