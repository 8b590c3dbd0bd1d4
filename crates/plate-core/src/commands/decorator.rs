use serde_json::{Map, Value};

use crate::commands::caret_at_start;
use crate::core::{Editor, EditorError};
use crate::decorator::Decorator;
use crate::node::{NodeKey, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Inserts `decorator` after the caret's top-level block (or at the end of
/// the document without a selection). A paragraph follows it when it would
/// otherwise be last, and the caret moves there.
pub fn insert_decorator(editor: &mut Editor, decorator: Decorator) -> Result<Option<NodeKey>, EditorError> {
    let anchor = editor.selection().map(|s| s.anchor.key);
    let source = format!("command:decorator.insert:{}", decorator.kind_name());
    editor.transact_from(&source, |tx| {
        let key = tx.create_decorator(decorator);
        let after = anchor.and_then(|a| tx.state().top_level(a));
        let placed = match after {
            Some(after) => tx.insert_after(after, key),
            None => {
                let root = tx.root();
                tx.append(root, key)
            }
        };
        if !placed {
            return Ok(None);
        }
        let next = match tx.state().next_sibling(key) {
            Some(next) => next,
            None => {
                let (paragraph, _) = tx.create_text_block(NodeKind::Paragraph, "");
                tx.insert_after(key, paragraph);
                paragraph
            }
        };
        caret_at_start(tx, next);
        Ok(Some(key))
    })
}

pub fn remove_decorator(editor: &mut Editor, key: NodeKey) -> Result<bool, EditorError> {
    if !is_decorator(editor, key) {
        return Ok(false);
    }
    editor.transact_from("command:decorator.remove", |tx| Ok(tx.remove(key)))
}

/// Swaps the decorator with its neighbour. `false` at either edge.
pub fn move_decorator(editor: &mut Editor, key: NodeKey, direction: MoveDirection) -> Result<bool, EditorError> {
    if !is_decorator(editor, key) {
        return Ok(false);
    }
    let source = match direction {
        MoveDirection::Up => "command:decorator.move_up",
        MoveDirection::Down => "command:decorator.move_down",
    };
    editor.transact_from(source, |tx| {
        let moved = match direction {
            MoveDirection::Up => tx
                .state()
                .previous_sibling(key)
                .is_some_and(|previous| tx.insert_before(previous, key)),
            MoveDirection::Down => tx
                .state()
                .next_sibling(key)
                .is_some_and(|next| tx.insert_after(next, key)),
        };
        Ok(moved)
    })
}

/// Places a copy with a fresh key right after the original.
pub fn duplicate_decorator(editor: &mut Editor, key: NodeKey) -> Result<Option<NodeKey>, EditorError> {
    if !is_decorator(editor, key) {
        return Ok(None);
    }
    editor.transact_from("command:decorator.duplicate", |tx| {
        let Some(copy) = tx.clone_node(key) else {
            return Ok(None);
        };
        Ok(tx.insert_after(key, copy).then_some(copy))
    })
}

/// Merges `fields` into the payload. A malformed field aborts the whole
/// update.
pub fn update_decorator(
    editor: &mut Editor,
    key: NodeKey,
    fields: &Map<String, Value>,
) -> Result<bool, EditorError> {
    let Some(current) = editor.read(|state| state.node(key).and_then(|n| n.as_decorator().cloned())) else {
        return Ok(false);
    };
    let mut next = current.clone();
    next.apply_fields(fields)?;
    if next == current {
        return Ok(false);
    }
    editor.transact_from("command:decorator.update", |tx| {
        let Some(payload) = tx.writable_decorator(key) else {
            return Err(EditorError::MissingNode(key));
        };
        *payload = next;
        Ok(true)
    })
}

fn is_decorator(editor: &Editor, key: NodeKey) -> bool {
    editor.read(|state| state.node(key).is_some_and(|n| n.kind.is_decorator()) && state.is_attached(key))
}
