//! Page session and installation guard.
//!
//! A [`PageSession`] lives as long as the page it instruments. It owns the
//! installation marker and hands out at most one [`Installation`] until the
//! session is ended (on navigation or reload).
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use pagetap_probe::console::Console;
//! use pagetap_probe::reporter::MemorySink;
//! use pagetap_probe::session::{PageSession, SessionMarker};
//! use serde_json::{json, Value};
//!
//! let sink = Rc::new(MemorySink::new());
//! let session = PageSession::new(
//!     Rc::new(SessionMarker::new()),
//!     Rc::new(|| "https://example.com/".to_string()),
//!     sink.clone(),
//! );
//!
//! let installation = session.install(|_: &[Value]| ()).expect("first install");
//! assert!(session.install(|_: &[Value]| ()).is_none());
//!
//! installation.console.log(&[json!("hello"), json!(42)]);
//! assert_eq!(sink.events().len(), 1);
//! ```

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, info};

use crate::config::Config;
use crate::console::{Console, InterceptedConsole};
use crate::message::MessageInterceptor;
use crate::mutation::MutationWatcher;
use crate::page::Page;
use crate::reporter::{EventSink, Reporter};

/// Marker recording whether a page has already been instrumented.
pub trait InstallationMarker {
    /// Sets the marker. Returns true if this call set it, false if it was
    /// already set.
    fn claim(&self) -> bool;

    /// Clears the marker.
    fn release(&self);
}

/// In-process installation marker.
#[derive(Debug, Default)]
pub struct SessionMarker {
    installed: Cell<bool>,
}

impl SessionMarker {
    /// Creates an unset marker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the marker is set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.installed.get()
    }
}

impl InstallationMarker for SessionMarker {
    fn claim(&self) -> bool {
        !self.installed.replace(true)
    }

    fn release(&self) {
        self.installed.set(false);
    }
}

/// The interceptors wired by a successful installation.
#[derive(Debug)]
pub struct Installation<C> {
    /// The page's logging capability, wrapped to report every call.
    pub console: InterceptedConsole<C>,
    /// Watcher to activate once the document is parsed.
    pub mutations: MutationWatcher,
    /// Handler for the page's incoming messages.
    pub messages: MessageInterceptor,
}

/// Instrumentation context for one page lifetime.
pub struct PageSession {
    marker: Rc<dyn InstallationMarker>,
    page: Rc<dyn Page>,
    sink: Rc<dyn EventSink>,
}

impl PageSession {
    /// Creates a session reporting to `sink`.
    pub fn new(
        marker: Rc<dyn InstallationMarker>,
        page: Rc<dyn Page>,
        sink: Rc<dyn EventSink>,
    ) -> Self {
        Self { marker, page, sink }
    }

    /// Creates a session posting events to the collector named in `config`.
    ///
    /// Returns the reporter alongside the session so the host can inspect
    /// delivery statistics.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Report` if the HTTP client cannot be initialized.
    pub fn connect(
        config: &Config,
        marker: Rc<dyn InstallationMarker>,
        page: Rc<dyn Page>,
    ) -> crate::Result<(Self, Reporter)> {
        let reporter = Reporter::new(config)?;
        let sink: Rc<dyn EventSink> = Rc::new(reporter.clone());
        Ok((Self::new(marker, page, sink), reporter))
    }

    /// Installs the probe, wrapping `console`.
    ///
    /// The marker is claimed before anything else happens. If it was already
    /// claimed, nothing is wired and `None` is returned, so the page never
    /// ends up with duplicate interceptors.
    pub fn install<C: Console>(&self, console: C) -> Option<Installation<C>> {
        if !self.marker.claim() {
            debug!("Probe already installed, skipping");
            return None;
        }

        let installation = Installation {
            console: InterceptedConsole::new(console, Rc::clone(&self.sink)),
            mutations: MutationWatcher::new(Rc::clone(&self.page), Rc::clone(&self.sink)),
            messages: MessageInterceptor::new(Rc::clone(&self.page), Rc::clone(&self.sink)),
        };

        info!(page = %self.page.location_href(), "Probe installed");
        Some(installation)
    }

    /// Ends the session, clearing the marker.
    ///
    /// Interceptors handed out earlier keep working; a later
    /// [`install`](Self::install) starts a fresh set.
    pub fn end(&self) {
        self.marker.release();
        debug!("Page session ended");
    }
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession").finish_non_exhaustive()
    }
}
