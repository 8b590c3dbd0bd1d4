use crate::node::{NodeKey, NodeKind, Style, TextData, TextFormat};
use crate::selection::Selection;
use crate::state::EditorState;
use crate::transaction::Transaction;

/// Owned, keyless subtree. Every importer produces one of these; it is
/// validated once and then materialized into a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTree {
    pub kind: NodeKind,
    pub style: Style,
    pub children: Vec<NodeTree>,
}

impl NodeTree {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            style: Style::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>, format: TextFormat) -> Self {
        Self::new(NodeKind::Text(TextData::new(text).with_format(format)))
    }

    /// A block holding one unformatted run.
    pub fn text_block(kind: NodeKind, text: impl Into<String>) -> Self {
        Self::new(kind).with_children(vec![Self::text(text, TextFormat::EMPTY)])
    }

    pub fn with_children(mut self, children: Vec<NodeTree>) -> Self {
        self.children = children;
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Copies `key`'s subtree out of a snapshot.
    pub fn from_state(state: &EditorState, key: NodeKey) -> Option<Self> {
        let node = state.node(key)?;
        let children = node
            .children()
            .iter()
            .filter_map(|child| Self::from_state(state, *child))
            .collect();
        Some(Self {
            kind: node.kind.clone(),
            style: node.style.clone(),
            children,
        })
    }

    /// Checks the leaf rule and the parent/child nesting rules for the
    /// whole subtree. The error names the first offending pair.
    pub fn validate(&self) -> Result<(), String> {
        if self.kind.is_leaf() && !self.children.is_empty() {
            return Err(format!("`{}` cannot have children", self.kind.name()));
        }
        for child in &self.children {
            if child.kind == NodeKind::Root {
                return Err("`root` can only appear at the top".into());
            }
            if !self.kind.can_contain(&child.kind) {
                return Err(format!(
                    "`{}` cannot contain `{}`",
                    self.kind.name(),
                    child.kind.name()
                ));
            }
            child.validate()?;
        }
        Ok(())
    }

    /// Concatenated text of the runs below this node.
    pub fn text_content(&self) -> String {
        match &self.kind {
            NodeKind::Text(t) => t.text.clone(),
            _ => self.children.iter().map(NodeTree::text_content).collect(),
        }
    }

    /// Creates the subtree under fresh keys. The returned node is detached.
    pub(crate) fn build(&self, tx: &mut Transaction) -> NodeKey {
        let key = tx.create(self.kind.clone());
        if !self.style.is_empty() {
            tx.replace_style(key, self.style.clone());
        }
        for child in &self.children {
            let child_key = child.build(tx);
            tx.append(key, child_key);
        }
        key
    }
}

/// Replaces every top-level block with `root`'s children and puts the caret
/// at the start of the new document.
pub(crate) fn replace_document(tx: &mut Transaction, root: &NodeTree) {
    tx.clear_root();
    let root_key = tx.root();
    for child in &root.children {
        let key = child.build(tx);
        tx.append(root_key, key);
    }
    let caret = tx.state().first_text_point();
    tx.set_selection(caret.map(Selection::collapsed));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_text_directly_under_root() {
        let tree = NodeTree::new(NodeKind::Root)
            .with_children(vec![NodeTree::text("loose", TextFormat::EMPTY)]);
        assert!(tree.validate().is_err());
    }

    #[test]
    fn validate_accepts_nested_lists() {
        let nested = NodeTree::new(NodeKind::List(crate::node::ListType::Bullet))
            .with_children(vec![NodeTree::text_block(NodeKind::ListItem, "inner")]);
        let item = NodeTree::new(NodeKind::ListItem)
            .with_children(vec![NodeTree::text("outer", TextFormat::EMPTY), nested]);
        let tree = NodeTree::new(NodeKind::Root).with_children(vec![
            NodeTree::new(NodeKind::List(crate::node::ListType::Bullet)).with_children(vec![item]),
        ]);
        assert_eq!(tree.validate(), Ok(()));
        assert_eq!(tree.text_content(), "outerinner");
    }
}
