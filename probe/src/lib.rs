//! pagetap probe - in-page activity relay.
//!
//! This crate instruments a web page and relays what happens in it to a
//! remote collector over HTTP.
//!
//! # Overview
//!
//! Three sources are intercepted once the probe is installed:
//!
//! - every `console.log` call, reported with its arguments
//! - markup inserted into the document tree
//! - cross-window messages delivered to the page
//!
//! Each occurrence becomes one [`Event`] posted to `<collector>/log`,
//! fire-and-forget. Nothing the probe does can fail the page it observes:
//! lost events are logged and counted, never raised.
//!
//! # Modules
//!
//! - [`types`]: Event and payload types
//! - [`config`]: Configuration from environment variables or build-time values
//! - [`error`]: Error types for probe setup
//! - [`page`]: Traits the host page implements
//! - [`reporter`]: Event sinks and the HTTP reporter
//! - [`console`]: Console interception
//! - [`mutation`]: DOM mutation watching
//! - [`message`]: Cross-window message interception
//! - [`session`]: Page session and installation guard
//! - `logging`: `tracing` subscriber setup (native targets)
//! - `web`: Browser bindings (`wasm32-unknown-unknown` only)

pub mod config;
pub mod console;
pub mod error;
pub mod message;
pub mod mutation;
pub mod page;
pub mod reporter;
pub mod session;
pub mod types;

#[cfg(not(all(target_arch = "wasm32", target_os = "unknown")))]
pub mod logging;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
pub mod web;

pub use config::{Config, ConfigError};
pub use console::{Console, ConsoleArg, InterceptedConsole};
pub use error::{ProbeError, Result};
pub use message::{IncomingMessage, MessageInterceptor};
pub use mutation::{DomMutation, MutationWatcher, ObserveOptions, WatcherState};
pub use page::{AccessDenied, CrossOriginWindow, Page, SameOriginWindow, SourceWindow};
pub use reporter::{
    report_payload, Delivery, DeliveryStats, EventSink, MemorySink, ReportError, Reporter,
};
pub use session::{Installation, InstallationMarker, PageSession, SessionMarker};
pub use types::{Event, EventKind, MessagePayload, MutationPayload};
