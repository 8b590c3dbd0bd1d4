use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::abort::AbortSignal;
use crate::node::NodeKey;
use crate::normalize;
use crate::plugin::{CommandError, CommandSpec, NormalizePass, PluginRegistry, QueryError};
use crate::selection::Selection;
use crate::state::EditorState;
use crate::tracker::{SelectionAttributes, resolve_selection};
use crate::transaction::{Finished, Transaction};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    #[error("node {0} does not exist")]
    MissingNode(NodeKey),
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("transaction aborted: {0}")]
    Aborted(String),
    #[error("a transaction is already being flushed")]
    Reentrant,
    #[error("normalization did not converge after {0} iterations")]
    NormalizeDidNotConverge(usize),
    #[error("invalid decorator payload: {0}")]
    InvalidPayload(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
    pub indent_step_px: f32,
    pub max_indent_px: f32,
    pub default_font_family: String,
    pub default_font_size: f32,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        if self.indent_step_px <= 0.0 {
            self.indent_step_px = 40.0;
        }
        if self.max_indent_px <= 0.0 {
            self.max_indent_px = 320.0;
        }
        if self.default_font_family.trim().is_empty() {
            self.default_font_family = "Arial".to_string();
        }
        if self.default_font_size <= 0.0 {
            self.default_font_size = 16.0;
        }
        self
    }

    /// Missing fields fall back to the defaults.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(s).map(Self::with_defaults)
    }
}

/// Published after every commit that changed content.
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    pub state: Arc<EditorState>,
    pub previous: Arc<EditorState>,
    pub dirty: BTreeSet<NodeKey>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionChange {
    pub previous: Option<Selection>,
    pub current: Option<Selection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<F: ?Sized> {
    id: ListenerId,
    signal: Option<AbortSignal>,
    callback: Box<F>,
}

impl<F: ?Sized> Listener<F> {
    fn is_live(&self) -> bool {
        !self.signal.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    state: Arc<EditorState>,
    selection: Option<Selection>,
}

pub struct Editor {
    state: Arc<EditorState>,
    selection: Option<Selection>,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    update_listeners: Vec<Listener<dyn FnMut(&UpdateEvent)>>,
    selection_listeners: Vec<Listener<dyn FnMut(&SelectionChange)>>,
    next_listener_id: u64,
}

impl Editor {
    pub fn new(state: EditorState, registry: PluginRegistry) -> Self {
        let selection = state.first_text_point().map(Selection::collapsed);
        let mut editor = Self {
            state: Arc::new(state),
            selection,
            registry,
            config: EditorConfig::default().with_defaults(),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            update_listeners: Vec::new(),
            selection_listeners: Vec::new(),
            next_listener_id: 1,
        };
        editor.normalize_in_place();
        editor
    }

    pub fn with_core_plugins() -> Self {
        Self::new(EditorState::empty(), PluginRegistry::core())
    }

    pub fn with_richtext_plugins() -> Self {
        Self::new(EditorState::empty(), PluginRegistry::richtext())
    }

    pub fn with_config(mut self, config: EditorConfig) -> Self {
        self.config = config.with_defaults();
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// The current published snapshot. Stays valid after later commits.
    pub fn state(&self) -> Arc<EditorState> {
        self.state.clone()
    }

    pub fn read<T>(&self, f: impl FnOnce(&EditorState) -> T) -> T {
        f(&self.state)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Stale or out-of-range points are rejected and leave the selection as is.
    pub fn set_selection(&mut self, selection: Option<Selection>) -> bool {
        if let Some(sel) = &selection {
            if !self.state.is_valid_point(&sel.anchor) || !self.state.is_valid_point(&sel.focus) {
                tracing::debug!(?sel, "rejected selection with stale points");
                return false;
            }
        }
        if selection == self.selection {
            return true;
        }
        let previous = std::mem::replace(&mut self.selection, selection);
        self.emit_selection(SelectionChange {
            previous,
            current: self.selection.clone(),
        });
        true
    }

    pub fn selection_attributes(&self) -> SelectionAttributes {
        resolve_selection(&self.state, self.selection.as_ref(), &self.config)
    }

    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Transaction) -> Result<T, EditorError>,
    ) -> Result<T, EditorError> {
        self.transact_from("transact", f)
    }

    /// Runs `f` against a staging copy. On `Ok` the copy is normalized and
    /// published; on `Err` it is dropped and the current snapshot stays the
    /// same `Arc`.
    pub fn transact_from<T>(
        &mut self,
        source: &str,
        f: impl FnOnce(&mut Transaction) -> Result<T, EditorError>,
    ) -> Result<T, EditorError> {
        let mut tx = Transaction::new(&self.state, self.selection.clone());
        let out = match f(&mut tx) {
            Ok(out) => out,
            Err(err) => {
                tracing::debug!(source, error = %err, "transaction discarded");
                return Err(err);
            }
        };
        if tx.is_dirty() {
            normalize::normalize(&mut tx, &self.registry, &self.config)?;
        }
        normalize::repair_selection(&mut tx);
        self.commit(tx.finish(), source);
        Ok(out)
    }

    fn commit(&mut self, finished: Finished, source: &str) {
        let content_changed = !finished.dirty.is_empty();
        let selection_changed = finished.selection != self.selection;
        if !content_changed && !selection_changed {
            return;
        }

        let previous_selection = std::mem::replace(&mut self.selection, finished.selection);
        if content_changed {
            let previous = std::mem::replace(&mut self.state, Arc::new(finished.state));
            self.push_undo(HistoryEntry {
                state: previous.clone(),
                selection: previous_selection.clone(),
            });
            self.redo_stack.clear();
            tracing::trace!(
                source,
                dirty = finished.dirty.len(),
                nodes = self.state.len(),
                "commit"
            );
            self.emit_update(UpdateEvent {
                state: self.state.clone(),
                previous,
                dirty: finished.dirty,
                source: source.to_string(),
            });
        }
        if selection_changed {
            self.emit_selection(SelectionChange {
                previous: previous_selection,
                current: self.selection.clone(),
            });
        }
    }

    fn normalize_in_place(&mut self) {
        let mut tx = Transaction::new(&self.state, self.selection.clone());
        if let Err(err) = normalize::normalize(&mut tx, &self.registry, &self.config) {
            tracing::warn!(error = %err, "initial document could not be normalized");
            return;
        }
        normalize::repair_selection(&mut tx);
        let finished = tx.finish();
        self.state = Arc::new(finished.state);
        self.selection = finished.selection;
    }

    fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push_back(entry);
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.undo_stack.pop_back() else {
            return false;
        };
        self.redo_stack.push(HistoryEntry {
            state: self.state.clone(),
            selection: self.selection.clone(),
        });
        self.restore(entry, "history.undo");
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.redo_stack.pop() else {
            return false;
        };
        self.undo_stack.push_back(HistoryEntry {
            state: self.state.clone(),
            selection: self.selection.clone(),
        });
        self.restore(entry, "history.redo");
        true
    }

    fn restore(&mut self, entry: HistoryEntry, source: &str) {
        let previous = std::mem::replace(&mut self.state, entry.state);
        let previous_selection = std::mem::replace(&mut self.selection, entry.selection);
        let dirty = changed_keys(&previous, &self.state);
        tracing::trace!(source, dirty = dirty.len(), "restore snapshot");
        self.emit_update(UpdateEvent {
            state: self.state.clone(),
            previous,
            dirty,
            source: source.to_string(),
        });
        if previous_selection != self.selection {
            self.emit_selection(SelectionChange {
                previous: previous_selection,
                current: self.selection.clone(),
            });
        }
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<bool, CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        tracing::debug!(command = id, "dispatch");
        let handled = (command.handler)(self, args)?;
        if !handled {
            tracing::debug!(command = id, "command not applicable to the current selection");
        }
        Ok(handled)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    pub fn register_update_listener(
        &mut self,
        signal: Option<AbortSignal>,
        f: impl FnMut(&UpdateEvent) + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.update_listeners.push(Listener {
            id,
            signal,
            callback: Box::new(f),
        });
        id
    }

    pub fn register_selection_listener(
        &mut self,
        signal: Option<AbortSignal>,
        f: impl FnMut(&SelectionChange) + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.selection_listeners.push(Listener {
            id,
            signal,
            callback: Box::new(f),
        });
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.update_listeners.len() + self.selection_listeners.len();
        self.update_listeners.retain(|l| l.id != id);
        self.selection_listeners.retain(|l| l.id != id);
        before != self.update_listeners.len() + self.selection_listeners.len()
    }

    pub fn listener_count(&mut self) -> usize {
        self.prune_listeners();
        self.update_listeners.len() + self.selection_listeners.len()
    }

    fn next_listener_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        id
    }

    fn prune_listeners(&mut self) {
        self.update_listeners.retain(Listener::is_live);
        self.selection_listeners.retain(Listener::is_live);
    }

    fn emit_update(&mut self, event: UpdateEvent) {
        self.prune_listeners();
        for listener in &mut self.update_listeners {
            (listener.callback)(&event);
        }
    }

    fn emit_selection(&mut self, change: SelectionChange) {
        self.prune_listeners();
        for listener in &mut self.selection_listeners {
            (listener.callback)(&change);
        }
    }

    pub fn core_normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        self.registry.normalize_passes()
    }

    pub fn core_commands(&self) -> &std::collections::HashMap<String, CommandSpec> {
        self.registry.commands()
    }
}

fn changed_keys(a: &EditorState, b: &EditorState) -> BTreeSet<NodeKey> {
    let mut out = BTreeSet::new();
    for (key, node) in &a.nodes {
        match b.node_arc(*key) {
            Some(other) if Arc::ptr_eq(node, other) => {}
            _ => {
                out.insert(*key);
            }
        }
    }
    for key in b.nodes.keys() {
        if !a.contains(*key) {
            out.insert(*key);
        }
    }
    out
}
