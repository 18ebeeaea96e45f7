//! Browser bindings for the probe.
//!
//! Compiled only for `wasm32-unknown-unknown`. When the module is
//! instantiated in a page, [`start`] installs the probe:
//!
//! - `window[<marker name>]` is the installation marker
//! - `console.log` is replaced by the intercepted console
//! - a `MutationObserver` is registered on the document element once the
//!   document has been parsed
//! - a `message` listener is registered on the window
//!
//! The closures handed to the browser live as long as the page, so they are
//! leaked with `forget`.

use std::rc::Rc;

use js_sys::{Array, Function, Reflect, JSON};
use serde_json::Value;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Element, MessageEvent, MutationObserver, MutationObserverInit, MutationRecord, Node, Window,
};

use crate::config::Config;
use crate::console::{Console, ConsoleArg, InterceptedConsole};
use crate::error::ProbeError;
use crate::message::{IncomingMessage, MessageInterceptor};
use crate::mutation::{DomMutation, MutationWatcher, ObserveOptions};
use crate::page::{AccessDenied, Page, SourceWindow};
use crate::reporter::{EventSink, ReportError};
use crate::session::{Installation, InstallationMarker, PageSession};
use crate::types::EventKind;

/// Evaluates to a factory building a variadic function that forwards its
/// arguments, as one array, to `handler`.
const VARIADIC_SHIM: &str =
    "(function (handler) { return function () { return handler(Array.from(arguments)); }; })";

/// Module entry point.
#[wasm_bindgen(start)]
pub fn start() {
    match install() {
        Ok(true) => debug!("pagetap probe installed"),
        Ok(false) => debug!("pagetap probe already present"),
        Err(e) => warn!(error = %e, "pagetap probe not installed"),
    }
}

/// Installs the probe into the current page.
///
/// Returns `Ok(false)` if the page already carries the installation marker.
///
/// # Errors
///
/// Returns `ProbeError::Host` if the page lacks a window, document or console.
pub fn install() -> Result<bool, ProbeError> {
    let config = Config::embedded()?;
    let window = web_sys::window().ok_or_else(|| host_error("no global window"))?;

    let marker = Rc::new(WindowMarker {
        window: window.clone(),
        name: config.marker_name.clone(),
    });
    let page: Rc<dyn Page> = Rc::new(WebPage {
        window: window.clone(),
    });
    let (session, reporter) = PageSession::connect(&config, marker, page)?;

    let console = Reflect::get(&window, &"console".into()).map_err(js_error)?;
    let log: Function = Reflect::get(&console, &"log".into())
        .map_err(js_error)?
        .dyn_into()
        .map_err(|_| host_error("console.log is not a function"))?;

    let Some(installation) = session.install(JsConsole {
        console: console.clone(),
        log,
    }) else {
        return Ok(false);
    };

    let Installation {
        console: intercepted,
        mutations,
        messages,
    } = installation;

    if let Err(e) = replace_console_log(&console, intercepted) {
        session.end();
        return Err(e);
    }
    watch_document(&window, mutations)?;
    listen_for_messages(&window, messages, Rc::new(reporter))?;

    Ok(true)
}

/// Installation marker stored as a property of `window`.
struct WindowMarker {
    window: Window,
    name: String,
}

impl InstallationMarker for WindowMarker {
    fn claim(&self) -> bool {
        let key = JsValue::from_str(&self.name);
        let existing = Reflect::get(&self.window, &key).unwrap_or(JsValue::UNDEFINED);
        if !existing.is_undefined() {
            return false;
        }
        match Reflect::set(&self.window, &key, &JsValue::TRUE) {
            Ok(true) => true,
            Ok(false) => {
                warn!(marker = %self.name, "Installation marker is read-only, not installing");
                false
            }
            Err(e) => {
                warn!(
                    marker = %self.name,
                    error = %describe(&e),
                    "Failed to set installation marker"
                );
                false
            }
        }
    }

    fn release(&self) {
        let _ = Reflect::delete_property(&self.window, &JsValue::from_str(&self.name));
    }
}

struct WebPage {
    window: Window,
}

impl Page for WebPage {
    fn location_href(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }
}

/// The page's original `console.log`, bound to `console`.
struct JsConsole {
    console: JsValue,
    log: Function,
}

impl Console for JsConsole {
    type Arg = JsValue;
    type Output = Result<JsValue, JsValue>;

    fn log(&self, args: &[JsValue]) -> Result<JsValue, JsValue> {
        let args: Array = args.iter().collect();
        self.log.apply(&self.console, &args)
    }

    fn completed(output: &Result<JsValue, JsValue>) -> bool {
        output.is_ok()
    }
}

impl ConsoleArg for JsValue {
    fn to_json(&self) -> Result<Value, serde_json::Error> {
        to_json(self)
    }
}

/// Converts a page value to JSON the way `JSON.stringify` sees it.
///
/// Values `JSON.stringify` skips (`undefined`, functions) become `null`.
fn to_json(value: &JsValue) -> Result<Value, serde_json::Error> {
    let text = JSON::stringify(value)
        .map_err(|e| <serde_json::Error as serde::de::Error>::custom(describe(&e)))?;

    match text.as_string() {
        Some(text) => serde_json::from_str(&text),
        None => Ok(Value::Null),
    }
}

fn replace_console_log(
    console: &JsValue,
    intercepted: InterceptedConsole<JsConsole>,
) -> Result<(), ProbeError> {
    let handler = Closure::<dyn Fn(Array) -> Result<JsValue, JsValue>>::new(move |args: Array| {
        let args: Vec<JsValue> = args.iter().collect();
        intercepted.log(&args)
    });

    let shim: Function = js_sys::eval(VARIADIC_SHIM)
        .map_err(js_error)?
        .dyn_into()
        .map_err(|_| host_error("console shim is not a function"))?;
    let wrapped = shim
        .call1(&JsValue::NULL, handler.as_ref())
        .map_err(js_error)?;
    Reflect::set(console, &"log".into(), &wrapped).map_err(js_error)?;

    handler.forget();
    Ok(())
}

fn watch_document(window: &Window, mutations: MutationWatcher) -> Result<(), ProbeError> {
    let document = window
        .document()
        .ok_or_else(|| host_error("window has no document"))?;
    let mutations = Rc::new(mutations);

    let on_batch = {
        let mutations = Rc::clone(&mutations);
        Closure::<dyn FnMut(Array, MutationObserver)>::new(
            move |records: Array, _observer: MutationObserver| {
                let batch: Vec<DomMutation> = records
                    .iter()
                    .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
                    .filter_map(|record| to_dom_mutation(&record))
                    .collect();
                mutations.observe(&batch);
            },
        )
    };
    let observer = MutationObserver::new(on_batch.as_ref().unchecked_ref()).map_err(js_error)?;
    on_batch.forget();

    let register = {
        let document = document.clone();
        move || {
            let options = observer_init(mutations.document_ready());
            let Some(root) = document.document_element() else {
                warn!("Document has no root element, mutations not observed");
                return;
            };
            if let Err(e) = observer.observe_with_options(&root, &options) {
                warn!(error = %describe(&e), "Failed to register mutation observer");
            }
        }
    };

    if document.ready_state() == "loading" {
        let on_ready = Closure::once_into_js(register);
        document
            .add_event_listener_with_callback("DOMContentLoaded", on_ready.unchecked_ref())
            .map_err(js_error)?;
    } else {
        register();
    }

    Ok(())
}

fn observer_init(options: ObserveOptions) -> MutationObserverInit {
    let init = MutationObserverInit::new();
    init.set_child_list(options.child_list);
    init.set_attributes(options.attributes);
    init.set_character_data(options.character_data);
    init.set_subtree(options.subtree);
    init.set_attribute_old_value(options.attribute_old_value);
    init.set_character_data_old_value(options.character_data_old_value);
    init
}

fn to_dom_mutation(record: &MutationRecord) -> Option<DomMutation> {
    match record.type_().as_str() {
        "childList" => {
            let nodes = record.added_nodes();
            let added = (0..nodes.length())
                .filter_map(|i| nodes.get(i))
                .map(|node| node_markup(&node))
                .collect();
            Some(DomMutation::ChildList {
                added,
                removed: record.removed_nodes().length() as usize,
            })
        }
        "attributes" => Some(DomMutation::Attributes {
            name: record.attribute_name().unwrap_or_default(),
            old_value: record.old_value(),
        }),
        "characterData" => Some(DomMutation::CharacterData {
            old_value: record.old_value(),
        }),
        _ => None,
    }
}

/// Markup of an added node. Only elements have markup; text and comment
/// nodes serialize empty.
fn node_markup(node: &Node) -> String {
    node.dyn_ref::<Element>()
        .map(Element::inner_html)
        .unwrap_or_default()
}

/// A message's `source`, read through reflection so that the browser's
/// cross-origin `SecurityError` surfaces as an error instead of a trap.
struct JsSource(JsValue);

impl SourceWindow for JsSource {
    fn location_href(&self) -> Result<String, AccessDenied> {
        let denied = |e: JsValue| AccessDenied::CrossOrigin(describe(&e));

        let location = Reflect::get(&self.0, &"location".into()).map_err(denied)?;
        let href = Reflect::get(&location, &"href".into()).map_err(denied)?;
        href.as_string()
            .ok_or_else(|| AccessDenied::CrossOrigin("location has no href".to_string()))
    }
}

fn listen_for_messages(
    window: &Window,
    messages: MessageInterceptor,
    drops: Rc<dyn EventSink>,
) -> Result<(), ProbeError> {
    let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        let data = match to_json(&event.data()) {
            Ok(data) => data,
            Err(e) => return drops.dropped(EventKind::Message, &ReportError::Json(e)),
        };
        let source = event.source().map(|source| JsSource(source.into()));

        let message = match &source {
            Some(source) => IncomingMessage::new(event.origin(), data, source),
            None => IncomingMessage::without_source(event.origin(), data),
        };
        messages.on_message(&message);
    });

    window
        .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())
        .map_err(js_error)?;
    on_message.forget();

    Ok(())
}

fn describe(error: &JsValue) -> String {
    error
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.message()))
        .or_else(|| error.as_string())
        .unwrap_or_else(|| format!("{error:?}"))
}

fn js_error(error: JsValue) -> ProbeError {
    ProbeError::Host(describe(&error))
}

fn host_error(message: &str) -> ProbeError {
    ProbeError::Host(message.to_string())
}
