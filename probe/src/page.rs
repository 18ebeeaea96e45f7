//! Host page seam.
//!
//! The interceptors never talk to a browser directly. Whatever embeds the
//! probe (the `web` adapter in a real page, a headless harness, a
//! test) implements these traits.

use thiserror::Error;

/// The page the probe is installed in.
pub trait Page {
    /// Returns the page's current location.
    fn location_href(&self) -> String;
}

impl<F> Page for F
where
    F: Fn() -> String,
{
    fn location_href(&self) -> String {
        self()
    }
}

/// Why a sending window's location could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    /// The browser's same-origin policy refused the read.
    #[error("cross-origin access denied: {0}")]
    CrossOrigin(String),

    /// The message was not sent by a window.
    #[error("message has no source window")]
    NoSource,
}

/// A window that posted a message to the page.
pub trait SourceWindow {
    /// Reads the window's location.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied::CrossOrigin` when the window belongs to another
    /// origin and the host refuses the read.
    fn location_href(&self) -> Result<String, AccessDenied>;
}

/// A window whose location is always readable, i.e. a same-origin sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SameOriginWindow {
    href: String,
}

impl SameOriginWindow {
    /// Creates a same-origin window located at `href`.
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

impl SourceWindow for SameOriginWindow {
    fn location_href(&self) -> Result<String, AccessDenied> {
        Ok(self.href.clone())
    }
}

/// A window whose location can never be read, i.e. a cross-origin sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossOriginWindow {
    origin: String,
}

impl CrossOriginWindow {
    /// Creates a cross-origin window belonging to `origin`.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }
}

impl SourceWindow for CrossOriginWindow {
    fn location_href(&self) -> Result<String, AccessDenied> {
        Err(AccessDenied::CrossOrigin(format!(
            "blocked a frame with origin \"{}\" from accessing its location",
            self.origin
        )))
    }
}
