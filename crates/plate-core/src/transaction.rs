use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::node::{Node, NodeKey, NodeKind, Style, TextData, TextFormat, clamp_to_char_boundary};
use crate::selection::{Point, Selection};
use crate::state::EditorState;

/// Writable staging copy of the document.
///
/// Every structural operation returns absence (`false` / `None`) for stale or
/// removed keys instead of failing, because keys captured before an update
/// may no longer exist when the mutation runs.
pub struct Transaction {
    state: EditorState,
    selection: Option<Selection>,
    dirty: BTreeSet<NodeKey>,
    detached: HashSet<NodeKey>,
    created: HashSet<NodeKey>,
}

pub(crate) struct Finished {
    pub state: EditorState,
    pub selection: Option<Selection>,
    pub dirty: BTreeSet<NodeKey>,
}

impl Transaction {
    pub(crate) fn new(state: &EditorState, selection: Option<Selection>) -> Self {
        Self {
            state: state.clone(),
            selection,
            dirty: BTreeSet::new(),
            detached: HashSet::new(),
            created: HashSet::new(),
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn root(&self) -> NodeKey {
        self.state.root()
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.state.node(key)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.state.parent(key)
    }

    /// Owned copy so callers can keep mutating while iterating.
    pub fn children(&self, key: NodeKey) -> Vec<NodeKey> {
        self.state.children(key).to_vec()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    pub fn set_caret(&mut self, key: NodeKey, offset: usize) {
        self.selection = Some(Selection::caret(key, offset));
    }

    pub fn dirty(&self) -> &BTreeSet<NodeKey> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Copy-on-write access. The published node is never touched; the staging
    /// map gets its own copy the first time a node is written.
    pub fn writable(&mut self, key: NodeKey) -> Option<&mut Node> {
        let node = self.state.nodes.get_mut(&key)?;
        self.dirty.insert(key);
        Some(Arc::make_mut(node))
    }

    /// Creates a detached node. It is garbage-collected at commit unless it is
    /// attached somewhere by then.
    pub fn create(&mut self, kind: NodeKind) -> NodeKey {
        let node = Node::new(kind);
        let key = node.key();
        self.state.nodes.insert(key, Arc::new(node));
        self.detached.insert(key);
        self.created.insert(key);
        self.dirty.insert(key);
        key
    }

    pub fn create_text(&mut self, text: impl Into<String>, format: TextFormat) -> NodeKey {
        self.create(NodeKind::Text(TextData::new(text).with_format(format)))
    }

    /// A block of `kind` holding one text run. Returns `(block, text)`.
    pub fn create_text_block(&mut self, kind: NodeKind, text: impl Into<String>) -> (NodeKey, NodeKey) {
        let block = self.create(kind);
        let text = self.create_text(text, TextFormat::EMPTY);
        self.append(block, text);
        (block, text)
    }

    fn can_attach(&self, parent: NodeKey, child: NodeKey) -> bool {
        if child == self.state.root() || !self.state.contains(child) {
            return false;
        }
        let Some(parent_node) = self.state.node(parent) else {
            return false;
        };
        if parent_node.kind.is_leaf() {
            return false;
        }
        !self.state.is_ancestor_or_self(child, parent)
    }

    /// Unlinks `key` from its parent, keeping the subtree alive for
    /// re-insertion within the same transaction.
    pub fn detach(&mut self, key: NodeKey) -> bool {
        if key == self.state.root() || !self.state.contains(key) {
            return false;
        }
        if let Some(parent) = self.state.parents.remove(&key) {
            if let Some(p) = self.writable(parent) {
                p.children.retain(|k| *k != key);
            }
        }
        self.detached.insert(key);
        self.dirty.insert(key);
        true
    }

    fn attach_at(&mut self, parent: NodeKey, index: usize, child: NodeKey) -> bool {
        let Some(p) = self.writable(parent) else {
            return false;
        };
        let index = index.min(p.children.len());
        p.children.insert(index, child);
        self.state.parents.insert(child, parent);
        self.detached.remove(&child);
        self.dirty.insert(child);
        true
    }

    pub fn append(&mut self, parent: NodeKey, child: NodeKey) -> bool {
        if !self.can_attach(parent, child) {
            return false;
        }
        self.detach(child);
        let len = self.state.children(parent).len();
        self.attach_at(parent, len, child)
    }

    pub fn insert_at(&mut self, parent: NodeKey, index: usize, child: NodeKey) -> bool {
        if !self.can_attach(parent, child) {
            return false;
        }
        self.detach(child);
        self.attach_at(parent, index, child)
    }

    pub fn insert_before(&mut self, sibling: NodeKey, node: NodeKey) -> bool {
        self.insert_relative(sibling, node, 0)
    }

    pub fn insert_after(&mut self, sibling: NodeKey, node: NodeKey) -> bool {
        self.insert_relative(sibling, node, 1)
    }

    fn insert_relative(&mut self, sibling: NodeKey, node: NodeKey, shift: usize) -> bool {
        if sibling == node {
            return false;
        }
        let Some(parent) = self.state.parent(sibling) else {
            return false;
        };
        if !self.can_attach(parent, node) {
            return false;
        }
        self.detach(node);
        let Some(ix) = self.state.index_in_parent(sibling) else {
            return false;
        };
        self.attach_at(parent, ix + shift, node)
    }

    /// Removes `key` and its whole subtree.
    pub fn remove(&mut self, key: NodeKey) -> bool {
        if !self.detach(key) {
            return false;
        }
        self.purge(key);
        true
    }

    fn purge(&mut self, key: NodeKey) {
        let mut doomed = self.state.descendants(key);
        doomed.push(key);
        for k in doomed {
            self.state.nodes.remove(&k);
            self.state.parents.remove(&k);
            self.detached.remove(&k);
            self.dirty.insert(k);
        }
    }

    /// Puts `new` where `old` was. With `keep_children`, `old`'s children move
    /// to `new` first.
    pub fn replace(&mut self, old: NodeKey, new: NodeKey, keep_children: bool) -> bool {
        if old == new || old == self.state.root() || self.state.parent(old).is_none() {
            return false;
        }
        if self.state.is_ancestor_or_self(new, old) {
            return false;
        }
        if !self.insert_before(old, new) {
            return false;
        }
        if keep_children {
            for child in self.children(old) {
                self.append(new, child);
            }
        }
        self.remove(old)
    }

    /// Deep copy of `key`'s subtree under fresh keys. The copy is detached.
    pub fn clone_node(&mut self, key: NodeKey) -> Option<NodeKey> {
        let source = self.state.node(key)?.clone();
        let copy = self.create(source.kind.clone());
        if let Some(node) = self.writable(copy) {
            node.style = source.style.clone();
        }
        for child in source.children() {
            if let Some(child_copy) = self.clone_node(*child) {
                self.append(copy, child_copy);
            }
        }
        Some(copy)
    }

    /// Removes every child of the root.
    pub fn clear_root(&mut self) {
        for child in self.children(self.state.root()) {
            self.remove(child);
        }
    }

    pub fn set_text(&mut self, key: NodeKey, text: impl Into<String>) -> bool {
        match self.writable(key).and_then(Node::as_text_mut) {
            Some(t) => {
                t.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn set_format(&mut self, key: NodeKey, format: TextFormat) -> bool {
        if self.state.text(key).is_none_or(|t| t.format == format) {
            return self.state.text(key).is_some();
        }
        match self.writable(key).and_then(Node::as_text_mut) {
            Some(t) => {
                t.format = format;
                true
            }
            None => false,
        }
    }

    pub fn set_kind(&mut self, key: NodeKey, kind: NodeKind) -> bool {
        if self.state.node(key).is_none_or(|n| n.kind.is_leaf() != kind.is_leaf()) {
            return false;
        }
        match self.writable(key) {
            Some(node) => {
                node.kind = kind;
                true
            }
            None => false,
        }
    }

    /// `None` removes the property.
    pub fn set_style(&mut self, key: NodeKey, property: &str, value: Option<String>) -> bool {
        let current = self.state.node(key).map(|n| n.style.get(property).cloned());
        match current {
            None => false,
            Some(current) if current == value => true,
            Some(_) => {
                let Some(node) = self.writable(key) else {
                    return false;
                };
                match value {
                    Some(value) => node.style.insert(property.to_string(), value),
                    None => node.style.remove(property),
                };
                true
            }
        }
    }

    pub fn replace_style(&mut self, key: NodeKey, style: Style) -> bool {
        match self.writable(key) {
            Some(node) => {
                node.style = style;
                true
            }
            None => false,
        }
    }

    /// Splits a text node at `offset`; the right half becomes a new sibling
    /// with the same format and style. Selection points past the split move to
    /// the new node. Returns the right half, or `None` when `offset` is at
    /// either edge.
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> Option<NodeKey> {
        let node = self.state.node(key)?;
        let text = node.as_text()?;
        let offset = clamp_to_char_boundary(&text.text, offset);
        if offset == 0 || offset >= text.text.len() {
            return None;
        }
        let right_text = text.text[offset..].to_string();
        let left_text = text.text[..offset].to_string();
        let format = text.format;
        let style = node.style.clone();

        let right = self.create_text(right_text, format);
        if let Some(n) = self.writable(right) {
            n.style = style;
        }
        if !self.insert_after(key, right) {
            return None;
        }
        self.set_text(key, left_text);

        if let Some(selection) = self.selection.as_mut() {
            for point in selection.points_mut() {
                if point.key == key && point.offset > offset {
                    *point = Point::new(right, point.offset - offset);
                }
            }
        }
        Some(right)
    }

    /// Isolates `[start, end)` of a text node into its own node and returns it.
    pub fn isolate_text(&mut self, key: NodeKey, start: usize, end: usize) -> Option<NodeKey> {
        let len = self.state.text(key)?.text.len();
        let end = end.min(len);
        if end < len {
            self.split_text(key, end);
        }
        if start > 0 && start < end {
            return self.split_text(key, start);
        }
        Some(key)
    }

    /// Moves selection points on `from` to `to`, shifting offsets by `shift`.
    pub(crate) fn remap_points(&mut self, from: NodeKey, to: NodeKey, shift: usize) {
        if let Some(selection) = self.selection.as_mut() {
            for point in selection.points_mut() {
                if point.key == from {
                    *point = Point::new(to, point.offset + shift);
                }
            }
        }
    }

    pub(crate) fn finish(mut self) -> Finished {
        let root = self.state.root();
        let orphans: Vec<NodeKey> = self
            .detached
            .iter()
            .copied()
            .filter(|k| *k != root && self.state.parent(*k).is_none())
            .collect();
        for key in orphans {
            if self.state.contains(key) {
                self.purge(key);
            }
        }
        // Nodes born and collected inside this transaction never existed.
        let state = &self.state;
        let created = &self.created;
        self.dirty.retain(|k| state.contains(*k) || !created.contains(k));
        Finished {
            state: self.state,
            selection: self.selection,
            dirty: self.dirty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph_with(tx: &mut Transaction, text: &str) -> (NodeKey, NodeKey) {
        let (p, t) = tx.create_text_block(NodeKind::Paragraph, text);
        let root = tx.root();
        tx.append(root, p);
        (p, t)
    }

    #[test]
    fn append_moves_instead_of_duplicating() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let (a, _) = paragraph_with(&mut tx, "a");
        let (b, tb) = paragraph_with(&mut tx, "b");
        assert!(tx.append(a, tb));
        assert!(tx.node(b).unwrap().children().is_empty());
        let finished = tx.finish();
        finished.state.check_integrity().unwrap();
    }

    #[test]
    fn cannot_insert_into_own_subtree() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let (p, t) = paragraph_with(&mut tx, "x");
        assert!(!tx.append(t, p));
        assert!(!tx.append(p, p));
        let root = tx.root();
        assert!(!tx.append(p, root));
    }

    #[test]
    fn unattached_nodes_are_collected() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let stray = tx.create(NodeKind::Paragraph);
        let finished = tx.finish();
        assert!(!finished.state.contains(stray));
        finished.state.check_integrity().unwrap();
    }

    #[test]
    fn split_text_moves_points_right_of_split() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let (_, t) = paragraph_with(&mut tx, "hello");
        tx.set_selection(Some(Selection::range(Point::new(t, 1), Point::new(t, 4))));
        let right = tx.split_text(t, 2).unwrap();
        let sel = tx.selection().unwrap();
        assert_eq!(sel.anchor, Point::new(t, 1));
        assert_eq!(sel.focus, Point::new(right, 2));
        assert_eq!(tx.state().text(t).unwrap().text, "he");
        assert_eq!(tx.state().text(right).unwrap().text, "llo");
    }

    #[test]
    fn clone_node_gets_fresh_keys() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let (p, t) = paragraph_with(&mut tx, "copy me");
        let copy = tx.clone_node(p).unwrap();
        assert_ne!(copy, p);
        let copy_text = tx.node(copy).unwrap().children()[0];
        assert_ne!(copy_text, t);
        assert_eq!(tx.state().text_content(copy), "copy me");
    }

    #[test]
    fn stale_keys_are_absent_not_errors() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let (p, _) = paragraph_with(&mut tx, "gone");
        assert!(tx.remove(p));
        assert!(!tx.remove(p));
        assert!(tx.node(p).is_none());
        assert!(tx.writable(p).is_none());
        assert!(!tx.insert_after(p, p));
    }
}
