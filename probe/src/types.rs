//! Event types relayed to the collector.
//!
//! Every event goes over the wire as `{"type": <kind>, "params": <payload>}`.
//! Payload structs serialize to camelCase JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A call to the page's logging function.
    #[serde(rename = "console.log")]
    ConsoleLog,
    /// Markup added to the document tree.
    #[serde(rename = "mutation")]
    Mutation,
    /// A cross-window message delivered to the page.
    #[serde(rename = "message")]
    Message,
}

impl EventKind {
    /// Returns the wire tag for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConsoleLog => "console.log",
            Self::Mutation => "mutation",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a [`EventKind::Mutation`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationPayload {
    /// Page location when the mutation was observed.
    pub page_url: String,
    /// Markup of each added node, in insertion order. Never contains empty strings.
    pub added_content: Vec<String>,
}

/// Payload of a [`EventKind::Message`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Location of the receiving page.
    pub page_url: String,
    /// Origin of the sender, as stated by the message envelope.
    pub origin: String,
    /// Location of the sending window.
    pub source_href: String,
    /// The message data, passed through untouched.
    pub data: Value,
}

/// A single reported occurrence.
///
/// Events carry no identifier or timestamp; arrival bookkeeping is the
/// collector's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// What produced the event.
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Source-specific data.
    pub params: Value,
}

impl Event {
    /// Creates an event from an already structured payload.
    #[must_use]
    pub fn new(kind: EventKind, params: Value) -> Self {
        Self { kind, params }
    }

    /// Creates an event from any serializable payload.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if the payload cannot be represented
    /// as JSON (e.g., a map with non-string keys).
    pub fn from_payload<T: Serialize + ?Sized>(
        kind: EventKind,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }

    /// Creates a console event carrying the raw call arguments.
    #[must_use]
    pub fn console(args: &[Value]) -> Self {
        Self::new(EventKind::ConsoleLog, Value::Array(args.to_vec()))
    }
}
