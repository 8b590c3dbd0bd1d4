use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Icons the toolbar shell knows how to draw. Each maps to an svg asset under
/// `icons/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolbarIcon {
    AlignLeft,
    ArrowDownToLine,
    ArrowUpToLine,
    AudioLines,
    Baseline,
    Bold,
    ChevronDown,
    CodeXml,
    Ellipsis,
    FileUp,
    Film,
    Highlighter,
    Image,
    IndentDecrease,
    IndentIncrease,
    Italic,
    Link,
    Unlink,
    List,
    ListCollapse,
    ListOrdered,
    ListTodo,
    MessageSquareText,
    Minus,
    PaintBucket,
    Pen,
    Plus,
    Redo2,
    Smile,
    Strikethrough,
    Table,
    Underline,
    Undo2,
    WandSparkles,
    WrapText,
}

impl ToolbarIcon {
    pub fn name(self) -> &'static str {
        match self {
            Self::AlignLeft => "align-left",
            Self::ArrowDownToLine => "arrow-down-to-line",
            Self::ArrowUpToLine => "arrow-up-to-line",
            Self::AudioLines => "audio-lines",
            Self::Baseline => "baseline",
            Self::Bold => "bold",
            Self::ChevronDown => "chevron-down",
            Self::CodeXml => "code-xml",
            Self::Ellipsis => "ellipsis",
            Self::FileUp => "file-up",
            Self::Film => "film",
            Self::Highlighter => "highlighter",
            Self::Image => "image",
            Self::IndentDecrease => "indent-decrease",
            Self::IndentIncrease => "indent-increase",
            Self::Italic => "italic",
            Self::Link => "link",
            Self::Unlink => "unlink",
            Self::List => "list",
            Self::ListCollapse => "list-collapse",
            Self::ListOrdered => "list-ordered",
            Self::ListTodo => "list-todo",
            Self::MessageSquareText => "message-square-text",
            Self::Minus => "minus",
            Self::PaintBucket => "paint-bucket",
            Self::Pen => "pen",
            Self::Plus => "plus",
            Self::Redo2 => "redo-2",
            Self::Smile => "smile",
            Self::Strikethrough => "strikethrough",
            Self::Table => "table",
            Self::Underline => "underline",
            Self::Undo2 => "undo-2",
            Self::WandSparkles => "wand-sparkles",
            Self::WrapText => "wrap-text",
        }
    }

    pub fn path(self) -> String {
        format!("icons/{}.svg", self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolbarItemKind {
    #[default]
    Command,
    Menu,
    Dropdown,
}

/// Definition supplied by whoever contributes a toolbar item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolbarOptions {
    pub kind: ToolbarItemKind,
    pub icon: Option<ToolbarIcon>,
    pub description: String,
    /// Command id the item runs, or the entries of a menu.
    pub payload: Option<Value>,
}

impl ToolbarOptions {
    pub fn command(icon: ToolbarIcon, description: impl Into<String>) -> Self {
        Self {
            kind: ToolbarItemKind::Command,
            icon: Some(icon),
            description: description.into(),
            payload: None,
        }
    }

    pub fn kind(mut self, kind: ToolbarItemKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn icon(mut self, icon: ToolbarIcon) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolbarItem {
    pub id: String,
    pub kind: ToolbarItemKind,
    pub icon: Option<ToolbarIcon>,
    pub description: String,
    pub payload: Option<Value>,
}

impl ToolbarItem {
    fn new(id: String, options: ToolbarOptions) -> Self {
        Self {
            id,
            kind: options.kind,
            icon: options.icon,
            description: options.description,
            payload: options.payload,
        }
    }

    fn matches(&self, options: &ToolbarOptions) -> bool {
        self.kind == options.kind
            && self.icon == options.icon
            && self.description == options.description
            && self.payload == options.payload
    }
}

/// The stock toolbar. Payloads name the command a click runs and its args.
pub fn default_toolbar_items() -> Vec<(&'static str, ToolbarOptions)> {
    use serde_json::json;

    let item = |icon, description: &str, command: &str, args: Value| {
        ToolbarOptions::command(icon, description).payload(json!({ "command": command, "args": args }))
    };
    vec![
        ("undo", item(ToolbarIcon::Undo2, "Undo", "history.undo", Value::Null)),
        ("redo", item(ToolbarIcon::Redo2, "Redo", "history.redo", Value::Null)),
        (
            "block_type",
            item(ToolbarIcon::ChevronDown, "Block type", "format.block", json!({ "block": "paragraph" }))
                .kind(ToolbarItemKind::Dropdown),
        ),
        ("bold", item(ToolbarIcon::Bold, "Bold", "format.bold", Value::Null)),
        ("italic", item(ToolbarIcon::Italic, "Italic", "format.italic", Value::Null)),
        ("underline", item(ToolbarIcon::Underline, "Underline", "format.underline", Value::Null)),
        (
            "strikethrough",
            item(ToolbarIcon::Strikethrough, "Strikethrough", "format.strikethrough", Value::Null),
        ),
        ("code", item(ToolbarIcon::CodeXml, "Inline code", "format.code", Value::Null)),
        (
            "font_color",
            item(ToolbarIcon::Baseline, "Text color", "style.set", json!({ "property": "color" }))
                .kind(ToolbarItemKind::Dropdown),
        ),
        (
            "highlight",
            item(
                ToolbarIcon::PaintBucket,
                "Background color",
                "style.set",
                json!({ "property": "background-color" }),
            )
            .kind(ToolbarItemKind::Dropdown),
        ),
        (
            "align",
            item(ToolbarIcon::AlignLeft, "Align", "align.set", json!({ "align": "left" }))
                .kind(ToolbarItemKind::Dropdown),
        ),
        ("bulleted_list", item(ToolbarIcon::List, "Bulleted list", "list.toggle", json!({ "kind": "bullet" }))),
        (
            "numbered_list",
            item(ToolbarIcon::ListOrdered, "Numbered list", "list.toggle", json!({ "kind": "number" })),
        ),
        ("outdent", item(ToolbarIcon::IndentDecrease, "Outdent", "indent.decrease", Value::Null)),
        ("indent", item(ToolbarIcon::IndentIncrease, "Indent", "indent.increase", Value::Null)),
        ("link", item(ToolbarIcon::Link, "Link", "link.insert", Value::Null).kind(ToolbarItemKind::Menu)),
        ("unlink", item(ToolbarIcon::Unlink, "Remove link", "link.remove", Value::Null)),
        ("table", item(ToolbarIcon::Table, "Table", "table.insert", json!({ "rows": 2, "cols": 2 }))),
        (
            "image",
            item(ToolbarIcon::Image, "Image", "decorator.insert", json!({ "type": "image" }))
                .kind(ToolbarItemKind::Menu),
        ),
        (
            "video",
            item(ToolbarIcon::Film, "Video", "decorator.insert", json!({ "type": "video" }))
                .kind(ToolbarItemKind::Menu),
        ),
        (
            "callout",
            item(
                ToolbarIcon::MessageSquareText,
                "Callout",
                "decorator.insert",
                json!({ "type": "callout", "variant": "info" }),
            ),
        ),
        (
            "divider",
            item(ToolbarIcon::Minus, "Divider", "decorator.insert", json!({ "type": "horizontal_rule" })),
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&Rc<[ToolbarItem]>)>;

struct Inner {
    items: Rc<[ToolbarItem]>,
    /// Live registration guards per id.
    owners: HashMap<String, usize>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

/// Ordered set of toolbar items keyed by id. Cloning shares the registry.
///
/// The snapshot is only rebuilt when an item actually changes, so hosts can
/// compare snapshots with [`Rc::ptr_eq`] to skip redundant renders.
#[derive(Clone)]
pub struct ToolbarRegistry {
    inner: Rc<RefCell<Inner>>,
}

impl Default for ToolbarRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolbarRegistry {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                items: Rc::from(Vec::new()),
                owners: HashMap::new(),
                subscribers: Vec::new(),
                next_subscription: 1,
            })),
        }
    }

    /// Adds `id` or updates it in place. Equal options leave the snapshot
    /// untouched; changed options keep the item's position.
    pub fn register(&self, id: impl Into<String>, options: ToolbarOptions) -> ToolbarRegistration {
        let id = id.into();
        let changed = {
            let mut inner = self.inner.borrow_mut();
            *inner.owners.entry(id.clone()).or_insert(0) += 1;
            let position = inner.items.iter().position(|item| item.id == id);
            match position {
                Some(index) if inner.items[index].matches(&options) => false,
                Some(index) => {
                    let mut items = inner.items.to_vec();
                    items[index] = ToolbarItem::new(id.clone(), options);
                    inner.items = Rc::from(items);
                    true
                }
                None => {
                    let mut items = inner.items.to_vec();
                    items.push(ToolbarItem::new(id.clone(), options));
                    inner.items = Rc::from(items);
                    true
                }
            }
        };
        if changed {
            tracing::trace!(%id, "toolbar item registered");
            self.notify();
        }
        ToolbarRegistration {
            registry: Rc::downgrade(&self.inner),
            ids: vec![id],
        }
    }

    /// Registers several items under one guard.
    pub fn register_all<I, S>(&self, items: I) -> ToolbarRegistration
    where
        I: IntoIterator<Item = (S, ToolbarOptions)>,
        S: Into<String>,
    {
        let mut ids = Vec::new();
        for (id, options) in items {
            let mut registration = self.register(id, options);
            ids.append(&mut registration.ids);
        }
        ToolbarRegistration {
            registry: Rc::downgrade(&self.inner),
            ids,
        }
    }

    /// Removes the listed ids regardless of outstanding guards. Unknown ids
    /// are ignored. Returns whether anything was removed.
    pub fn unregister(&self, ids: &[&str]) -> bool {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            for id in ids {
                inner.owners.remove(*id);
            }
            remove_items(&mut inner, |item| ids.contains(&item.id.as_str()))
        };
        if removed {
            self.notify();
        }
        removed
    }

    pub fn clear(&self) {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            inner.owners.clear();
            remove_items(&mut inner, |_| true)
        };
        if removed {
            self.notify();
        }
    }

    pub fn snapshot(&self) -> Rc<[ToolbarItem]> {
        self.inner.borrow().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<ToolbarItem> {
        self.inner.borrow().items.iter().find(|item| item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `f` runs after every change with the new snapshot.
    pub fn subscribe(&self, f: impl FnMut(&Rc<[ToolbarItem]>) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.subscribers.push((id, Box::new(f)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    fn notify(&self) {
        notify(&self.inner);
    }
}

fn remove_items(inner: &mut Inner, mut doomed: impl FnMut(&ToolbarItem) -> bool) -> bool {
    if !inner.items.iter().any(&mut doomed) {
        return false;
    }
    let kept: Vec<ToolbarItem> = inner.items.iter().filter(|item| !doomed(*item)).cloned().collect();
    inner.items = Rc::from(kept);
    true
}

fn notify(inner: &Rc<RefCell<Inner>>) {
    // Subscribers may touch the registry, so none of them run under a borrow.
    let (items, mut subscribers) = {
        let mut inner = inner.borrow_mut();
        (inner.items.clone(), std::mem::take(&mut inner.subscribers))
    };
    for (_, subscriber) in subscribers.iter_mut() {
        subscriber(&items);
    }
    let mut inner = inner.borrow_mut();
    subscribers.append(&mut inner.subscribers);
    inner.subscribers = subscribers;
}

/// Keeps its ids registered until dropped or explicitly unregistered. An id
/// registered through several guards stays until the last one lets go.
#[must_use = "dropping the registration removes its toolbar items"]
pub struct ToolbarRegistration {
    registry: Weak<RefCell<Inner>>,
    ids: Vec<String>,
}

impl ToolbarRegistration {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Releases `only` (or every id when `None`) and keeps the rest.
    pub fn unregister(&mut self, only: Option<&[&str]>) -> bool {
        let released: Vec<String> = match only {
            Some(subset) => {
                let (released, kept): (Vec<String>, Vec<String>) = std::mem::take(&mut self.ids)
                    .into_iter()
                    .partition(|id| subset.contains(&id.as_str()));
                self.ids = kept;
                released
            }
            None => std::mem::take(&mut self.ids),
        };
        self.release(released)
    }

    fn release(&self, ids: Vec<String>) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        if ids.is_empty() {
            return false;
        }
        let removed = {
            let mut guard = inner.borrow_mut();
            let mut doomed = Vec::new();
            for id in ids {
                if let Some(count) = guard.owners.get_mut(&id) {
                    *count -= 1;
                    if *count == 0 {
                        guard.owners.remove(&id);
                        doomed.push(id);
                    }
                }
            }
            remove_items(&mut guard, |item| doomed.contains(&item.id))
        };
        if removed {
            notify(&inner);
        }
        removed
    }
}

impl Drop for ToolbarRegistration {
    fn drop(&mut self) {
        let ids = std::mem::take(&mut self.ids);
        self.release(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_paths_use_kebab_names() {
        assert_eq!(ToolbarIcon::Redo2.path(), "icons/redo-2.svg");
        assert_eq!(ToolbarIcon::MessageSquareText.name(), "message-square-text");
    }

    #[test]
    fn last_guard_removes_the_item() {
        let registry = ToolbarRegistry::new();
        let first = registry.register("bold", ToolbarOptions::command(ToolbarIcon::Bold, "Bold"));
        let second = registry.register("bold", ToolbarOptions::command(ToolbarIcon::Bold, "Bold"));
        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());
    }
}
