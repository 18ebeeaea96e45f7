//! Event reporting for the pagetap probe.
//!
//! Every interceptor hands its events to an [`EventSink`]. The network sink is
//! [`Reporter`], which posts each event to `<collector>/log`:
//!
//! - One request per event, no batching
//! - Fire-and-forget: the request runs detached and nobody waits for it
//! - No retry, no backoff, no timeout
//! - Losses are logged and counted in [`DeliveryStats`], never surfaced to callers
//!
//! # Example
//!
//! ```no_run
//! use pagetap_probe::config::Config;
//! use pagetap_probe::reporter::{EventSink, Reporter};
//! use pagetap_probe::types::Event;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::new("http://localhost:3333", "__PAGETAP_INSTALLED__").unwrap();
//!     let reporter = Reporter::new(&config).unwrap();
//!
//!     reporter.report(Event::console(&[json!("hello"), json!(42)]));
//! }
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::page::AccessDenied;
use crate::types::{Event, EventKind};

/// Errors that can occur while reporting an event.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request could not be delivered (DNS, refused connection, CORS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The payload could not be represented as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// There is no executor to run the request on.
    #[error("no async runtime available to deliver the event")]
    NoRuntime,

    /// The message sender's location could not be read.
    #[error("message source unreadable: {0}")]
    SourceUnreadable(#[from] AccessDenied),
}

/// Outcome of a request that reached the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// HTTP status returned by the collector.
    pub status: u16,
}

impl Delivery {
    /// Returns true if the collector answered with a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Point-in-time view of a reporter's delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events the collector accepted.
    pub sent: u64,
    /// Events the collector answered with a non-success status.
    pub rejected: u64,
    /// Events lost to a transport failure.
    pub failed: u64,
    /// Events dropped before a request was issued.
    pub dropped: u64,
}

impl DeliveryStats {
    /// Total number of events whose delivery attempt has finished.
    #[must_use]
    pub fn settled(&self) -> u64 {
        self.sent + self.rejected + self.failed + self.dropped
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            sent: self.sent.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Destination for events produced by the interceptors.
///
/// Implementations must not block and must never panic or return errors to
/// the caller: the page being observed has to behave identically whether or
/// not reporting works.
pub trait EventSink {
    /// Hands an event over for delivery.
    fn report(&self, event: Event);

    /// Records an event that was lost before it could be handed over.
    fn dropped(&self, kind: EventKind, error: &ReportError) {
        debug!(kind = %kind, error = %error, "Event dropped");
    }
}

/// Serializes `payload` and reports it, dropping the event if serialization fails.
pub fn report_payload<T>(sink: &dyn EventSink, kind: EventKind, payload: &T)
where
    T: Serialize + ?Sized,
{
    match Event::from_payload(kind, payload) {
        Ok(event) => sink.report(event),
        Err(e) => sink.dropped(kind, &ReportError::Json(e)),
    }
}

/// HTTP reporter posting events to the collector.
#[derive(Debug, Clone)]
pub struct Reporter {
    client: Client,
    endpoint: Arc<str>,
    counters: Arc<Counters>,
}

impl Reporter {
    /// Creates a reporter for the collector named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Client` if the HTTP client cannot be initialized.
    pub fn new(config: &Config) -> Result<Self, ReportError> {
        let client = Client::builder().build().map_err(ReportError::Client)?;

        Ok(Self {
            client,
            endpoint: Arc::from(config.endpoint()),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Returns the URL events are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the current delivery counters.
    #[must_use]
    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }

    /// Sends one event and waits for the collector's answer.
    ///
    /// A non-success status is not an error: it is returned in the
    /// [`Delivery`] and counted as rejected.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Json` if the event cannot be serialized and
    /// `ReportError::Http` if the request fails.
    pub async fn send(&self, event: &Event) -> Result<Delivery, ReportError> {
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(ReportError::Json(e));
            }
        };

        post(
            self.client.clone(),
            Arc::clone(&self.endpoint),
            body,
            Arc::clone(&self.counters),
        )
        .await
    }
}

impl EventSink for Reporter {
    fn report(&self, event: Event) {
        let kind = event.kind;
        let body = match serde_json::to_vec(&event) {
            Ok(body) => body,
            Err(e) => return self.dropped(kind, &ReportError::Json(e)),
        };

        trace!(kind = %kind, bytes = body.len(), "Reporting event");

        let task = post(
            self.client.clone(),
            Arc::clone(&self.endpoint),
            body,
            Arc::clone(&self.counters),
        );

        if let Err(e) = spawn_detached(async move {
            // Outcome is already logged and counted by `post`.
            let _ = task.await;
        }) {
            self.dropped(kind, &e);
        }
    }

    fn dropped(&self, kind: EventKind, error: &ReportError) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(kind = %kind, error = %error, "Event dropped before delivery");
    }
}

/// Posts a serialized event and records the outcome.
async fn post(
    client: Client,
    endpoint: Arc<str>,
    body: Vec<u8>,
    counters: Arc<Counters>,
) -> Result<Delivery, ReportError> {
    let result = client
        .post(&*endpoint)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await;

    match result {
        Ok(response) => {
            let delivery = Delivery {
                status: response.status().as_u16(),
            };

            if delivery.is_success() {
                counters.sent.fetch_add(1, Ordering::Relaxed);
                debug!(status = delivery.status, "Event delivered");
            } else {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(status = delivery.status, "Collector rejected event");
            }

            Ok(delivery)
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(url = %endpoint, error = %e, "Failed to deliver event");
            Err(ReportError::Http(e))
        }
    }
}

/// Runs `task` on the current tokio runtime without waiting for it.
#[cfg(not(all(target_arch = "wasm32", target_os = "unknown")))]
fn spawn_detached<F>(task: F) -> Result<(), ReportError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| ReportError::NoRuntime)?;
    handle.spawn(task);
    Ok(())
}

/// Runs `task` on the page's microtask queue without waiting for it.
#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
fn spawn_detached<F>(task: F) -> Result<(), ReportError>
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(task);
    Ok(())
}

/// Sink that keeps events in memory.
///
/// Useful for hosts that collect events locally instead of posting them.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RefCell<Vec<Event>>,
    dropped: RefCell<Vec<EventKind>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event reported so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Removes and returns every event reported so far.
    pub fn take(&self) -> Vec<Event> {
        self.events.take()
    }

    /// Returns the kinds of the events dropped so far, in order.
    #[must_use]
    pub fn dropped_kinds(&self) -> Vec<EventKind> {
        self.dropped.borrow().clone()
    }
}

impl EventSink for MemorySink {
    fn report(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    fn dropped(&self, kind: EventKind, error: &ReportError) {
        debug!(kind = %kind, error = %error, "Event dropped");
        self.dropped.borrow_mut().push(kind);
    }
}
