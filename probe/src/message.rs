//! Cross-window message interception.
//!
//! Building a message event needs the sender's location, which the browser
//! refuses to reveal for cross-origin senders. A failed read is retried once
//! with the identical construction; when that fails too, the event is lost.

use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::page::{AccessDenied, Page, SourceWindow};
use crate::reporter::{report_payload, EventSink, ReportError};
use crate::types::{EventKind, MessagePayload};

/// A message delivered to the page.
pub struct IncomingMessage<'a> {
    /// Origin of the sender, as stated by the envelope.
    pub origin: String,
    /// The message data.
    pub data: Value,
    /// The window that posted the message, if any.
    pub source: Option<&'a dyn SourceWindow>,
}

impl<'a> IncomingMessage<'a> {
    /// Creates a message posted by `source`.
    #[must_use]
    pub fn new(origin: impl Into<String>, data: Value, source: &'a dyn SourceWindow) -> Self {
        Self {
            origin: origin.into(),
            data,
            source: Some(source),
        }
    }

    /// Creates a message that was not posted by a window (e.g., a port).
    #[must_use]
    pub fn without_source(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
            source: None,
        }
    }
}

/// Reports every message delivered to the page.
pub struct MessageInterceptor {
    page: Rc<dyn Page>,
    sink: Rc<dyn EventSink>,
}

impl MessageInterceptor {
    pub(crate) fn new(page: Rc<dyn Page>, sink: Rc<dyn EventSink>) -> Self {
        Self { page, sink }
    }

    /// Handles one delivered message. Returns true if an event was reported.
    pub fn on_message(&self, message: &IncomingMessage<'_>) -> bool {
        let payload = match self.build(message) {
            Ok(payload) => payload,
            Err(first) => {
                debug!(
                    origin = %message.origin,
                    error = %first,
                    "Source location unreadable, retrying"
                );
                match self.build(message) {
                    Ok(payload) => payload,
                    Err(second) => {
                        let error = ReportError::SourceUnreadable(second);
                        self.sink.dropped(EventKind::Message, &error);
                        return false;
                    }
                }
            }
        };

        report_payload(&*self.sink, EventKind::Message, &payload);
        true
    }

    fn build(&self, message: &IncomingMessage<'_>) -> Result<MessagePayload, AccessDenied> {
        let source = message.source.ok_or(AccessDenied::NoSource)?;

        Ok(MessagePayload {
            page_url: self.page.location_href(),
            origin: message.origin.clone(),
            source_href: source.location_href()?,
            data: message.data.clone(),
        })
    }
}

impl std::fmt::Debug for MessageInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageInterceptor").finish_non_exhaustive()
    }
}
