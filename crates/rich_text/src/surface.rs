use std::cell::RefCell;
use std::rc::Rc;

use manos_plate_core::dom::{DomElement, DomNode};
use manos_plate_core::{
    AbortController, CommandError, Editor, EditorError, NodeKey, Point, Selection, TextFormatType,
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::active_formats::{ToolbarAction, ToolbarError, ToolbarState, ToolbarStore};
use crate::decorator_menu::{
    DecoratorSelection, DecoratorState, FloatingMenu, LayoutProvider, MenuAction, SurfaceConfig,
    position_menu,
};
use crate::render::{render_document, render_menu};
use crate::scheduler::{TaskKind, TaskQueue};
use crate::toolbar::{ToolbarItemKind, ToolbarRegistry};

#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Toolbar(#[from] ToolbarError),
    #[error("unknown toolbar item: {0}")]
    UnknownItem(String),
}

/// What the host delivers. Keystrokes use the `modifier-key` form
/// (`"ctrl-b"`, `"cmd-shift-z"`, `"backspace"`); coordinates are in the
/// same space as the [`LayoutProvider`] rects.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key(String),
    Text(String),
    PointerDown { x: f32, y: f32 },
    Scroll,
    Resize,
    Focus,
    Blur,
    Paste(String),
}

struct KeyBinding {
    keystroke: &'static str,
    command: &'static str,
}

const fn bind(keystroke: &'static str, command: &'static str) -> KeyBinding {
    KeyBinding { keystroke, command }
}

const KEY_BINDINGS: &[KeyBinding] = &[
    bind("backspace", "text.delete_backward"),
    bind("delete", "text.delete_forward"),
    bind("enter", "text.insert_paragraph"),
    bind("secondary-a", "selection.select_all"),
    bind("secondary-z", "history.undo"),
    bind("secondary-shift-z", "history.redo"),
    bind("secondary-y", "history.redo"),
    bind("secondary-b", "format.bold"),
    bind("secondary-i", "format.italic"),
    bind("secondary-u", "format.underline"),
    bind("secondary-shift-x", "format.strikethrough"),
    bind("secondary-e", "format.code"),
    bind("tab", "indent.increase"),
    bind("shift-tab", "indent.decrease"),
];

/// Maps the platform's primary modifier to `secondary`.
fn normalize_keystroke(keystroke: &str) -> String {
    let lower = keystroke.trim().to_ascii_lowercase();
    #[cfg(target_os = "macos")]
    let primary = "cmd-";
    #[cfg(not(target_os = "macos"))]
    let primary = "ctrl-";
    match lower.strip_prefix(primary) {
        Some(rest) => format!("secondary-{rest}"),
        None => lower,
    }
}

type FrameHook = Box<dyn FnMut(&mut EditorSurface)>;

/// One editing surface: the editor plus the toolbar, the decorator menu and
/// the deferred work that keeps them in step with the document.
pub struct EditorSurface {
    editor: Editor,
    toolbar: ToolbarRegistry,
    toolbar_store: ToolbarStore,
    decorators: DecoratorSelection,
    menu: Option<FloatingMenu>,
    tasks: Rc<RefCell<TaskQueue>>,
    layout: Box<dyn LayoutProvider>,
    config: SurfaceConfig,
    listeners: AbortController,
    frame_hooks: Vec<FrameHook>,
    focused: bool,
    saved_selection: Option<Selection>,
    flushing: bool,
}

impl EditorSurface {
    pub fn new(mut editor: Editor, layout: impl LayoutProvider + 'static) -> Self {
        let tasks = Rc::new(RefCell::new(TaskQueue::new()));
        let listeners = AbortController::new();

        let queue = tasks.clone();
        editor.register_update_listener(Some(listeners.signal()), move |_| {
            let mut queue = queue.borrow_mut();
            queue.schedule(TaskKind::SyncToolbar);
            queue.schedule(TaskKind::RepositionMenu);
        });
        let queue = tasks.clone();
        editor.register_selection_listener(Some(listeners.signal()), move |_| {
            queue.borrow_mut().schedule(TaskKind::SyncToolbar);
        });
        tasks.borrow_mut().schedule(TaskKind::SyncToolbar);

        let toolbar_store = ToolbarStore::new(ToolbarState::new(editor.config()));
        Self {
            editor,
            toolbar: ToolbarRegistry::new(),
            toolbar_store,
            decorators: DecoratorSelection::default(),
            menu: None,
            tasks,
            layout: Box::new(layout),
            config: SurfaceConfig::default().with_defaults(),
            listeners,
            frame_hooks: Vec::new(),
            focused: true,
            saved_selection: None,
            flushing: false,
        }
    }

    pub fn with_config(mut self, config: SurfaceConfig) -> Self {
        self.config = config.with_defaults();
        self
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut Editor {
        &mut self.editor
    }

    /// Detaches the surface's listeners and hands the editor back.
    pub fn into_editor(self) -> Editor {
        self.listeners.abort();
        self.editor
    }

    pub fn toolbar(&self) -> &ToolbarRegistry {
        &self.toolbar
    }

    pub fn toolbar_state(&self) -> &ToolbarState {
        self.toolbar_store.state()
    }

    /// Applies a toolbar action in its wire form, e.g.
    /// `{"type": "activate", "format": "bold"}`.
    pub fn dispatch_toolbar_action(&mut self, action: &Value) -> Result<bool, SurfaceError> {
        let action = ToolbarAction::from_json(action)?;
        Ok(self.toolbar_store.dispatch(action).state_changed)
    }

    pub fn subscribe_toolbar_state(&mut self, f: impl FnMut(&ToolbarState) + 'static) {
        self.toolbar_store.subscribe(f);
    }

    pub fn decorator_selection(&self) -> &DecoratorSelection {
        &self.decorators
    }

    pub fn decorator_state(&self, key: NodeKey) -> DecoratorState {
        self.decorators.state_of(key)
    }

    pub fn menu(&self) -> Option<&FloatingMenu> {
        self.menu.as_ref()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// `f` runs at the end of every [`flush`](Self::flush). Dispatching from
    /// inside it fails with [`EditorError::Reentrant`].
    pub fn on_frame(&mut self, f: impl FnMut(&mut EditorSurface) + 'static) {
        self.frame_hooks.push(Box::new(f));
    }

    /// Runs a command against the editor. Focus (and the selection it held)
    /// is restored first so commands from menus see a real selection.
    pub fn dispatch(&mut self, command: &str, args: Option<Value>) -> Result<bool, SurfaceError> {
        self.ensure_idle()?;
        self.restore_focus();
        Ok(self.editor.run_command(command, args)?)
    }

    /// Runs the command behind a toolbar item. `args` are merged over the
    /// item's own args. Format buttons flip their active state right away;
    /// the next flush reconciles it with the document.
    pub fn click_toolbar(&mut self, id: &str, args: Option<Value>) -> Result<bool, SurfaceError> {
        self.ensure_idle()?;
        let item = self
            .toolbar
            .get(id)
            .ok_or_else(|| SurfaceError::UnknownItem(id.to_string()))?;
        let Some(command) = item
            .payload
            .as_ref()
            .and_then(|p| p.get("command"))
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            tracing::debug!(item = id, "toolbar item has no command");
            return Ok(false);
        };
        let base = item.payload.as_ref().and_then(|p| p.get("args")).cloned();
        let args = merge_args(base, args);
        if item.kind == ToolbarItemKind::Command {
            if let Some(format) = command.strip_prefix("format.").and_then(TextFormatType::parse) {
                self.toolbar_store.dispatch(ToolbarAction::Toggle(format));
            }
        }
        self.dispatch(&command, args)
    }

    pub fn handle_event(&mut self, event: InputEvent) -> Result<bool, SurfaceError> {
        self.ensure_idle()?;
        match event {
            InputEvent::Key(keystroke) => self.handle_key(&keystroke),
            InputEvent::Text(_) | InputEvent::Paste(_) if self.decorators.editing().is_some() => Ok(false),
            InputEvent::Text(text) => {
                if text.is_empty() {
                    return Ok(false);
                }
                self.deselect_decorator();
                self.dispatch("text.insert", Some(json!({ "text": text })))
            }
            InputEvent::Paste(text) => self.paste(&text),
            InputEvent::PointerDown { x, y } => self.pointer_down(x, y),
            InputEvent::Scroll | InputEvent::Resize => {
                if self.decorators.selected().is_some() {
                    self.tasks.borrow_mut().schedule(TaskKind::RepositionMenu);
                }
                Ok(false)
            }
            InputEvent::Focus => {
                self.restore_focus();
                Ok(true)
            }
            InputEvent::Blur => {
                if self.focused {
                    self.focused = false;
                    self.saved_selection = self.editor.selection().cloned();
                    self.editor.set_selection(None);
                }
                Ok(true)
            }
        }
    }

    /// Drains the deferred work: toolbar sync and menu placement, then the
    /// frame hooks.
    pub fn flush(&mut self) -> Result<(), SurfaceError> {
        self.ensure_idle()?;
        self.flushing = true;
        self.prune_stale_decorator();
        let tasks = self.tasks.borrow_mut().drain();
        for task in tasks {
            match task {
                TaskKind::SyncToolbar => self.sync_toolbar(),
                TaskKind::RepositionMenu => self.reposition_menu(),
            }
        }
        let mut hooks = std::mem::take(&mut self.frame_hooks);
        for hook in hooks.iter_mut() {
            hook(self);
        }
        hooks.append(&mut self.frame_hooks);
        self.frame_hooks = hooks;
        self.flushing = false;
        Ok(())
    }

    /// Selects a decorator as if its surface had been clicked. `false` for
    /// keys that are not attached decorators.
    pub fn select_decorator(&mut self, key: NodeKey) -> bool {
        let is_decorator = self
            .editor
            .read(|state| state.is_attached(key) && state.node(key).is_some_and(|n| n.kind.is_decorator()));
        if !is_decorator {
            return false;
        }
        if let Some(previous) = self.decorators.select(key) {
            tracing::trace!(%previous, %key, "decorator selection moved");
        }
        self.menu = None;
        self.tasks.borrow_mut().schedule(TaskKind::RepositionMenu);
        true
    }

    pub fn deselect_decorator(&mut self) -> bool {
        self.menu = None;
        self.tasks.borrow_mut().cancel(TaskKind::RepositionMenu);
        self.decorators.deselect().is_some()
    }

    pub fn run_menu_action(&mut self, action: MenuAction) -> Result<bool, SurfaceError> {
        self.ensure_idle()?;
        let Some(key) = self.decorators.selected() else {
            return Ok(false);
        };
        match action {
            MenuAction::Edit => {
                self.menu = None;
                Ok(self.decorators.begin_edit())
            }
            MenuAction::MoveUp => {
                let moved = self.dispatch("decorator.move_up", Some(json!({ "key": key })))?;
                self.tasks.borrow_mut().schedule(TaskKind::RepositionMenu);
                Ok(moved)
            }
            MenuAction::MoveDown => {
                let moved = self.dispatch("decorator.move_down", Some(json!({ "key": key })))?;
                self.tasks.borrow_mut().schedule(TaskKind::RepositionMenu);
                Ok(moved)
            }
            MenuAction::Delete => self.delete_selected_decorator(key),
        }
    }

    pub fn set_edit_field(&mut self, name: impl Into<String>, value: Value) -> bool {
        self.decorators.set_field(name, value)
    }

    /// `editing → unselected`, committing the draft through `decorator.update`.
    /// A draft the payload rejects keeps the form open.
    pub fn save_edit(&mut self) -> Result<bool, SurfaceError> {
        self.ensure_idle()?;
        let (Some(key), Some(fields)) = (self.decorators.editing(), self.decorators.draft()) else {
            return Ok(false);
        };
        let changed = if fields.is_empty() {
            false
        } else {
            let args = json!({ "key": key, "fields": Value::Object(fields.clone()) });
            self.dispatch("decorator.update", Some(args))?
        };
        self.decorators.finish_edit();
        Ok(changed)
    }

    pub fn cancel_edit(&mut self) -> bool {
        self.decorators.finish_edit().is_some()
    }

    pub fn render(&self) -> Vec<DomNode> {
        self.editor.read(|state| render_document(state, &self.decorators))
    }

    pub fn render_menu(&self) -> Option<DomElement> {
        self.menu.as_ref().map(render_menu)
    }

    fn ensure_idle(&self) -> Result<(), SurfaceError> {
        if self.flushing {
            return Err(EditorError::Reentrant.into());
        }
        Ok(())
    }

    fn restore_focus(&mut self) {
        if self.focused {
            return;
        }
        self.focused = true;
        let saved = self.saved_selection.take();
        if self.editor.selection().is_none() && saved.is_some() && !self.editor.set_selection(saved) {
            tracing::debug!("saved selection went stale while unfocused");
        }
        self.tasks.borrow_mut().schedule(TaskKind::SyncToolbar);
    }

    fn handle_key(&mut self, keystroke: &str) -> Result<bool, SurfaceError> {
        let keystroke = normalize_keystroke(keystroke);
        if self.decorators.editing().is_some() {
            // The edit form owns the keyboard.
            return Ok(keystroke == "escape" && self.cancel_edit());
        }
        if let Some(key) = self.decorators.selected() {
            match keystroke.as_str() {
                "delete" | "backspace" => return self.delete_selected_decorator(key),
                "escape" => return Ok(self.deselect_decorator()),
                "up" | "left" => return Ok(self.leave_decorator(key, false)),
                "down" | "right" => return Ok(self.leave_decorator(key, true)),
                _ => {}
            }
        }
        let Some(binding) = KEY_BINDINGS.iter().find(|b| b.keystroke == keystroke) else {
            return Ok(false);
        };
        self.deselect_decorator();
        self.dispatch(binding.command, None)
    }

    fn delete_selected_decorator(&mut self, key: NodeKey) -> Result<bool, SurfaceError> {
        let removed = self.dispatch("decorator.remove", Some(json!({ "key": key })))?;
        self.deselect_decorator();
        Ok(removed)
    }

    /// Moves the caret to the neighbouring block's edge and drops the
    /// decorator selection.
    fn leave_decorator(&mut self, key: NodeKey, forward: bool) -> bool {
        let target = self.editor.read(|state| {
            let mut sibling = if forward { state.next_sibling(key) } else { state.previous_sibling(key) };
            while let Some(block) = sibling {
                let texts = state.text_nodes_in(block);
                let point = if forward {
                    texts.first().map(|k| Point::new(*k, 0))
                } else {
                    texts
                        .last()
                        .map(|k| Point::new(*k, state.text(*k).map_or(0, |t| t.text.len())))
                };
                if point.is_some() {
                    return point;
                }
                sibling = if forward { state.next_sibling(block) } else { state.previous_sibling(block) };
            }
            None
        });
        if let Some(point) = target {
            self.editor.set_selection(Some(Selection::collapsed(point)));
        }
        self.deselect_decorator();
        true
    }

    fn paste(&mut self, text: &str) -> Result<bool, SurfaceError> {
        self.deselect_decorator();
        self.dispatch("text.paste", Some(json!({ "text": text })))
    }

    fn pointer_down(&mut self, x: f32, y: f32) -> Result<bool, SurfaceError> {
        if let Some(action) = self.menu.as_ref().and_then(|m| m.action_at(x, y)) {
            return self.run_menu_action(action);
        }
        // Decorators may sit in table cells; the smallest rect under the
        // pointer is the innermost hit.
        let hit = self.editor.read(|state| {
            state
                .keys_in_order()
                .into_iter()
                .filter(|k| state.node(*k).is_some_and(|n| n.kind.is_decorator()))
                .filter_map(|k| {
                    let rect = self.layout.node_rect(k)?;
                    rect.contains(x, y).then_some((k, rect.width * rect.height))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(k, _)| k)
        });
        match hit {
            Some(key) if self.decorators.key() == Some(key) => Ok(false),
            Some(key) => Ok(self.select_decorator(key)),
            None => Ok(self.deselect_decorator()),
        }
    }

    fn prune_stale_decorator(&mut self) {
        let Some(key) = self.decorators.key() else {
            return;
        };
        if !self.editor.read(|state| state.is_attached(key)) {
            tracing::debug!(%key, "selected decorator left the document");
            self.decorators.deselect();
            self.menu = None;
        }
    }

    fn sync_toolbar(&mut self) {
        if !self.focused {
            tracing::trace!("surface unfocused; toolbar sync skipped");
            return;
        }
        let attrs = self.editor.selection_attributes();
        self.toolbar_store.dispatch(ToolbarAction::Sync(attrs));
        self.toolbar_store.dispatch(ToolbarAction::SetHistory {
            can_undo: self.editor.can_undo(),
            can_redo: self.editor.can_redo(),
        });
    }

    fn reposition_menu(&mut self) {
        let Some(key) = self.decorators.selected() else {
            self.menu = None;
            return;
        };
        let (Some(surface), Some(node)) = (self.layout.surface_rect(), self.layout.node_rect(key)) else {
            self.menu = None;
            return;
        };
        let (rect, placement) = position_menu(node, surface, &self.config);
        self.menu = Some(FloatingMenu {
            key,
            rect,
            origin: (surface.x, surface.y),
            placement,
        });
    }
}

fn merge_args(base: Option<Value>, args: Option<Value>) -> Option<Value> {
    match (base, args) {
        (Some(Value::Object(mut base)), Some(Value::Object(extra))) => {
            base.extend(extra);
            Some(Value::Object(base))
        }
        (_, Some(args)) if !args.is_null() => Some(args),
        (Some(base), _) if !base.is_null() => Some(base),
        _ => None,
    }
}
