//! Console interception.
//!
//! [`InterceptedConsole`] decorates a logging capability: callers get exactly
//! what the original returns, and every call that returns normally
//! additionally produces one `console.log` event. A call that throws is
//! rethrown and not reported.
//!
//! Arguments are converted to JSON only after the original has run. If any
//! argument cannot be converted (a cyclic object, say), the call still goes
//! through but its event is dropped.

use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::reporter::{EventSink, ReportError};
use crate::types::{Event, EventKind};

/// An argument that can be carried in a console event.
pub trait ConsoleArg {
    /// Converts the argument to JSON.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if the value has no JSON form.
    fn to_json(&self) -> Result<Value, serde_json::Error>;
}

impl ConsoleArg for Value {
    fn to_json(&self) -> Result<Value, serde_json::Error> {
        Ok(self.clone())
    }
}

/// A logging capability taking an ordered list of arguments.
///
/// Any `Fn(&[Value]) -> R` closure is a `Console`.
pub trait Console {
    /// Argument type accepted by the logging function.
    type Arg;

    /// Whatever the logging function returns.
    type Output;

    /// Logs `args`.
    fn log(&self, args: &[Self::Arg]) -> Self::Output;

    /// Returns false if `output` means the call threw instead of returning.
    fn completed(output: &Self::Output) -> bool {
        let _ = output;
        true
    }
}

impl<F, R> Console for F
where
    F: Fn(&[Value]) -> R,
{
    type Arg = Value;
    type Output = R;

    fn log(&self, args: &[Value]) -> R {
        self(args)
    }
}

/// A console that reports every call after forwarding it to the original.
pub struct InterceptedConsole<C> {
    inner: C,
    sink: Rc<dyn EventSink>,
}

impl<C: Console> InterceptedConsole<C> {
    /// Wraps `inner`, reporting calls to `sink`.
    ///
    /// Only [`PageSession::install`](crate::session::PageSession::install)
    /// should do this for a page's console, so that it happens once.
    pub(crate) fn new(inner: C, sink: Rc<dyn EventSink>) -> Self {
        Self { inner, sink }
    }

    /// Returns the wrapped capability.
    #[must_use]
    pub fn original(&self) -> &C {
        &self.inner
    }
}

impl<C> Console for InterceptedConsole<C>
where
    C: Console,
    C::Arg: ConsoleArg,
{
    type Arg = C::Arg;
    type Output = C::Output;

    fn log(&self, args: &[C::Arg]) -> C::Output {
        let result = self.inner.log(args);
        if !C::completed(&result) {
            trace!(args = args.len(), "Original console call threw, not reported");
            return result;
        }
        trace!(args = args.len(), "Intercepted console call");

        match args.iter().map(ConsoleArg::to_json).collect::<Result<Vec<_>, _>>() {
            Ok(values) => self.sink.report(Event::console(&values)),
            Err(e) => self.sink.dropped(EventKind::ConsoleLog, &ReportError::Json(e)),
        }

        result
    }

    fn completed(output: &C::Output) -> bool {
        C::completed(output)
    }
}

impl<C> std::fmt::Debug for InterceptedConsole<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptedConsole").finish_non_exhaustive()
    }
}
