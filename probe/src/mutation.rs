//! DOM mutation watching.
//!
//! The watcher starts out [`WatcherState::Unregistered`] and becomes
//! [`WatcherState::Active`] once the host signals that the document has been
//! fully parsed. From then on it stays active for the lifetime of the page;
//! there is no disconnect.
//!
//! Every mutation type is observed, but only child-list records with
//! non-empty added markup are reported. Attribute and character-data records
//! are intentionally inert.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::page::Page;
use crate::reporter::{report_payload, EventSink};
use crate::types::{EventKind, MutationPayload};

/// Lifecycle of a [`MutationWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Waiting for the document to finish parsing.
    Unregistered,
    /// Registered against the document; receiving batches.
    Active,
}

/// What the host observer must be registered for.
///
/// Mirrors the browser's `MutationObserverInit` dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub attributes: bool,
    pub character_data: bool,
    pub subtree: bool,
    pub attribute_old_value: bool,
    pub character_data_old_value: bool,
}

impl ObserveOptions {
    /// Observe everything on the whole subtree, capturing old values.
    pub const FULL: Self = Self {
        child_list: true,
        attributes: true,
        character_data: true,
        subtree: true,
        attribute_old_value: true,
        character_data_old_value: true,
    };
}

/// A single change record, as delivered by the host observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomMutation {
    /// Children were added to or removed from a node.
    ChildList {
        /// Serialized markup of each added node, in order. Nodes without
        /// renderable content serialize to an empty string.
        added: Vec<String>,
        /// Number of removed nodes.
        removed: usize,
    },
    /// An attribute changed.
    Attributes {
        name: String,
        old_value: Option<String>,
    },
    /// The text of a character-data node changed.
    CharacterData { old_value: Option<String> },
}

/// Watches the document tree and reports inserted markup.
pub struct MutationWatcher {
    state: Cell<WatcherState>,
    page: Rc<dyn Page>,
    sink: Rc<dyn EventSink>,
}

impl MutationWatcher {
    pub(crate) fn new(page: Rc<dyn Page>, sink: Rc<dyn EventSink>) -> Self {
        Self {
            state: Cell::new(WatcherState::Unregistered),
            page,
            sink,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.state.get()
    }

    /// Signals that the document is fully parsed.
    ///
    /// Activates the watcher and returns the options the host observer must
    /// be registered with on the document root. Calling this again once
    /// active changes nothing.
    pub fn document_ready(&self) -> ObserveOptions {
        if self.state.replace(WatcherState::Active) == WatcherState::Unregistered {
            debug!("Mutation watcher active");
        }
        ObserveOptions::FULL
    }

    /// Processes one batch of change records.
    ///
    /// Emits one `mutation` event per child-list record that added at least
    /// one node with non-empty markup. Returns the number of events emitted.
    pub fn observe(&self, batch: &[DomMutation]) -> usize {
        if self.state.get() != WatcherState::Active {
            trace!(records = batch.len(), "Ignoring mutations before document ready");
            return 0;
        }

        let mut emitted = 0;

        for mutation in batch {
            match mutation {
                DomMutation::ChildList { added, removed } => {
                    let added_content: Vec<String> =
                        added.iter().filter(|m| !m.is_empty()).cloned().collect();

                    if added_content.is_empty() {
                        trace!(added = added.len(), removed, "Child list without markup");
                        continue;
                    }

                    let payload = MutationPayload {
                        page_url: self.page.location_href(),
                        added_content,
                    };
                    report_payload(&*self.sink, EventKind::Mutation, &payload);
                    emitted += 1;
                }
                DomMutation::Attributes { name, old_value } => {
                    trace!(attribute = %name, old_value = ?old_value, "Attribute changed");
                }
                DomMutation::CharacterData { old_value } => {
                    trace!(old_value = ?old_value, "Character data changed");
                }
            }
        }

        emitted
    }
}

impl std::fmt::Debug for MutationWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationWatcher")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}
