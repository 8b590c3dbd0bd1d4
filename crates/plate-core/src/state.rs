use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::node::{Node, NodeKey, NodeKind, TextData};
use crate::selection::{Point, Selection};

/// An immutable snapshot of the document tree.
///
/// Node bodies are `Arc`-shared between snapshots; a transaction clones the
/// maps and only copies the nodes it touches. Parent links live in a
/// side-table so the tree never holds a reference cycle.
#[derive(Debug, Clone)]
pub struct EditorState {
    root: NodeKey,
    pub(crate) nodes: HashMap<NodeKey, Arc<Node>>,
    pub(crate) parents: HashMap<NodeKey, NodeKey>,
}

/// The part of a text node covered by a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSlice {
    pub key: NodeKey,
    pub start: usize,
    pub end: usize,
}

impl TextSlice {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl Default for EditorState {
    fn default() -> Self {
        Self::empty()
    }
}

impl EditorState {
    /// Root only, no children. Normalization turns this into [`EditorState::empty`].
    pub(crate) fn bare() -> Self {
        let root = Node::new(NodeKind::Root);
        let key = root.key();
        let mut nodes = HashMap::new();
        nodes.insert(key, Arc::new(root));
        Self {
            root: key,
            nodes,
            parents: HashMap::new(),
        }
    }

    /// Root with a single empty paragraph.
    pub fn empty() -> Self {
        let mut state = Self::bare();
        let paragraph = state.insert_detached(Node::new(NodeKind::Paragraph));
        let text = state.insert_detached(Node::new(NodeKind::text("")));
        state.link(paragraph, text);
        state.link(state.root, paragraph);
        state
    }

    fn insert_detached(&mut self, node: Node) -> NodeKey {
        let key = node.key();
        self.nodes.insert(key, Arc::new(node));
        key
    }

    fn link(&mut self, parent: NodeKey, child: NodeKey) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            Arc::make_mut(node).children.push(child);
            self.parents.insert(child, parent);
        }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key).map(Arc::as_ref)
    }

    pub(crate) fn node_arc(&self, key: NodeKey) -> Option<&Arc<Node>> {
        self.nodes.get(&key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        let children = self.children(self.root);
        match children {
            [] => true,
            [only] => self.text_content(*only).is_empty() && self.node(*only).is_some_and(|n| {
                matches!(n.kind, NodeKind::Paragraph)
            }),
            _ => false,
        }
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.parents.get(&key).copied()
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.node(key).map(Node::children).unwrap_or(&[])
    }

    pub fn text(&self, key: NodeKey) -> Option<&TextData> {
        self.node(key).and_then(Node::as_text)
    }

    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.children(parent).iter().position(|k| *k == key)
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let ix = self.index_in_parent(key)?;
        ix.checked_sub(1)
            .and_then(|ix| self.children(parent).get(ix).copied())
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let ix = self.index_in_parent(key)?;
        self.children(parent).get(ix + 1).copied()
    }

    /// Ancestors from the immediate parent up to the root.
    pub fn ancestors(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        std::iter::successors(self.parent(key), move |k| self.parent(*k))
    }

    /// Self first, then ancestors.
    pub fn find_ancestor_or_self(
        &self,
        key: NodeKey,
        mut pred: impl FnMut(&Node) -> bool,
    ) -> Option<NodeKey> {
        std::iter::once(key)
            .chain(self.ancestors(key))
            .find(|k| self.node(*k).is_some_and(&mut pred))
    }

    pub fn is_attached(&self, key: NodeKey) -> bool {
        key == self.root || self.ancestors(key).any(|k| k == self.root)
    }

    pub fn is_ancestor_or_self(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        ancestor == key || self.ancestors(key).any(|k| k == ancestor)
    }

    pub fn path_of(&self, key: NodeKey) -> Option<Vec<usize>> {
        if !self.contains(key) {
            return None;
        }
        let mut path = Vec::new();
        let mut current = key;
        while current != self.root {
            path.push(self.index_in_parent(current)?);
            current = self.parent(current)?;
        }
        path.reverse();
        Some(path)
    }

    /// Pre-order walk of the subtree under `key`, excluding `key` itself.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeKey> = self.children(key).iter().rev().copied().collect();
        while let Some(k) = stack.pop() {
            out.push(k);
            stack.extend(self.children(k).iter().rev().copied());
        }
        out
    }

    /// Every attached node in document order, root first.
    pub fn keys_in_order(&self) -> Vec<NodeKey> {
        let mut out = vec![self.root];
        out.extend(self.descendants(self.root));
        out
    }

    pub fn text_nodes(&self) -> Vec<NodeKey> {
        self.text_nodes_in(self.root)
    }

    pub fn text_nodes_in(&self, key: NodeKey) -> Vec<NodeKey> {
        self.descendants(key)
            .into_iter()
            .filter(|k| self.node(*k).is_some_and(Node::is_text))
            .collect()
    }

    /// Nearest text block or top-level decorator containing `key`.
    pub fn nearest_block(&self, key: NodeKey) -> Option<NodeKey> {
        self.find_ancestor_or_self(key, |n| n.kind.is_text_block() || n.kind.is_decorator())
    }

    /// Ancestor-or-self whose parent is the root.
    pub fn top_level(&self, key: NodeKey) -> Option<NodeKey> {
        if key == self.root {
            return None;
        }
        std::iter::once(key)
            .chain(self.ancestors(key))
            .find(|k| self.parent(*k) == Some(self.root))
    }

    pub fn text_content(&self, key: NodeKey) -> String {
        let Some(node) = self.node(key) else {
            return String::new();
        };
        match &node.kind {
            NodeKind::Text(t) => t.text.clone(),
            NodeKind::Decorator(d) => d.text_content(),
            kind if kind.is_text_block() || matches!(kind, NodeKind::Link { .. }) => {
                let mut out = String::new();
                for child in node.children() {
                    let is_list = self
                        .node(*child)
                        .is_some_and(|n| matches!(n.kind, NodeKind::List(_)));
                    if is_list {
                        out.push('\n');
                    }
                    out.push_str(&self.text_content(*child));
                }
                out
            }
            _ => node
                .children()
                .iter()
                .map(|c| self.text_content(*c))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn first_text_point(&self) -> Option<Point> {
        self.text_nodes().first().map(|k| Point::new(*k, 0))
    }

    pub fn last_text_point(&self) -> Option<Point> {
        let key = *self.text_nodes().last()?;
        let len = self.text(key)?.text.len();
        Some(Point::new(key, len))
    }

    pub fn is_valid_point(&self, point: &Point) -> bool {
        self.text(point.key).is_some_and(|t| {
            point.offset <= t.text.len() && t.text.is_char_boundary(point.offset)
        }) && self.is_attached(point.key)
    }

    /// Document-order comparison. `None` when either point is stale.
    pub fn compare_points(&self, a: &Point, b: &Point) -> Option<Ordering> {
        if a.key == b.key {
            return Some(a.offset.cmp(&b.offset));
        }
        let pa = self.path_of(a.key)?;
        let pb = self.path_of(b.key)?;
        Some(pa.cmp(&pb))
    }

    /// `(start, end)` in document order.
    pub fn ordered_points(&self, selection: &Selection) -> (Point, Point) {
        match self.compare_points(&selection.anchor, &selection.focus) {
            Some(Ordering::Greater) => (selection.focus, selection.anchor),
            _ => (selection.anchor, selection.focus),
        }
    }

    /// Text nodes spanned by the selection, with the covered byte range of each.
    /// Nodes touched only at a boundary yield empty slices and are omitted.
    pub fn selected_text_slices(&self, selection: &Selection) -> Vec<TextSlice> {
        let (start, end) = self.ordered_points(selection);
        let texts = self.text_nodes();
        let Some(first) = texts.iter().position(|k| *k == start.key) else {
            return Vec::new();
        };
        let Some(last) = texts.iter().position(|k| *k == end.key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for key in &texts[first..=last.max(first)] {
            let Some(text) = self.text(*key) else {
                continue;
            };
            let len = text.text.len();
            let s = if *key == start.key { start.offset.min(len) } else { 0 };
            let e = if *key == end.key { end.offset.min(len) } else { len };
            let slice = TextSlice {
                key: *key,
                start: s,
                end: e,
            };
            if !slice.is_empty() {
                out.push(slice);
            }
        }
        out
    }

    /// Text blocks touched by the selection, in document order.
    pub fn selected_blocks(&self, selection: &Selection) -> Vec<NodeKey> {
        let (start, end) = self.ordered_points(selection);
        let texts = self.text_nodes();
        let first = texts.iter().position(|k| *k == start.key);
        let last = texts.iter().position(|k| *k == end.key);
        let (Some(first), Some(last)) = (first, last) else {
            return self.nearest_block(selection.anchor.key).into_iter().collect();
        };
        let mut out: Vec<NodeKey> = Vec::new();
        for key in &texts[first..=last.max(first)] {
            if let Some(block) = self.nearest_block(*key) {
                if !out.contains(&block) {
                    out.push(block);
                }
            }
        }
        out
    }

    /// Verifies the structural invariants: every attached node has exactly one
    /// parent entry that agrees with its parent's children, leaves are
    /// childless, and no node is reachable twice.
    pub fn check_integrity(&self) -> Result<(), String> {
        if self.parent(self.root).is_some() {
            return Err("root has a parent".into());
        }
        let mut seen: HashMap<NodeKey, NodeKey> = HashMap::new();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let node = self
                .node(key)
                .ok_or_else(|| format!("dangling child key {key}"))?;
            if node.key() != key {
                return Err(format!("node stored under {key} reports key {}", node.key()));
            }
            if node.kind.is_leaf() && !node.children().is_empty() {
                return Err(format!("leaf {key} has children"));
            }
            for child in node.children() {
                if let Some(previous) = seen.insert(*child, key) {
                    return Err(format!(
                        "node {child} appears under both {previous} and {key}"
                    ));
                }
                if self.parent(*child) != Some(key) {
                    return Err(format!("parent side-table disagrees for {child}"));
                }
                stack.push(*child);
            }
        }
        if seen.len() + 1 != self.nodes.len() {
            return Err(format!(
                "{} nodes stored but {} reachable",
                self.nodes.len(),
                seen.len() + 1
            ));
        }
        if self.parents.len() != seen.len() {
            return Err("parent side-table holds stale entries".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_is_consistent() {
        let state = EditorState::empty();
        state.check_integrity().unwrap();
        assert!(state.is_empty());
        assert_eq!(state.text_nodes().len(), 1);
        let point = state.first_text_point().unwrap();
        assert_eq!(state.path_of(point.key), Some(vec![0, 0]));
    }

    #[test]
    fn bare_state_has_no_children() {
        let state = EditorState::bare();
        assert!(state.children(state.root()).is_empty());
        state.check_integrity().unwrap();
    }
}
