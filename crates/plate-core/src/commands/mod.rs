//! Command bodies. Each takes the editor, runs at most one transaction and
//! reports whether anything changed; argument parsing lives with the plugins.

pub mod block;
pub mod decorator;
pub mod format;
pub mod link;
pub mod list;
pub mod table;
pub mod text;

use crate::node::NodeKey;
use crate::selection::Selection;
use crate::state::EditorState;
use crate::transaction::Transaction;

/// Text blocks touched by the selection.
pub(crate) fn selected_text_blocks(state: &EditorState, selection: &Selection) -> Vec<NodeKey> {
    state
        .selected_blocks(selection)
        .into_iter()
        .filter(|k| state.node(*k).is_some_and(|n| n.kind.is_text_block()))
        .collect()
}

/// Splits the selected text so every covered range is its own node, and
/// returns those nodes in document order.
pub(crate) fn isolate_selected_text(tx: &mut Transaction, selection: &Selection) -> Vec<NodeKey> {
    let slices = tx.state().selected_text_slices(selection);
    slices
        .into_iter()
        .filter_map(|s| tx.isolate_text(s.key, s.start, s.end))
        .collect()
}

/// Caret on the first text position inside `key`.
pub(crate) fn caret_at_start(tx: &mut Transaction, key: NodeKey) -> bool {
    match tx.state().text_nodes_in(key).first().copied() {
        Some(text) => {
            tx.set_caret(text, 0);
            true
        }
        None if tx.node(key).is_some_and(|n| n.is_text()) => {
            tx.set_caret(key, 0);
            true
        }
        None => false,
    }
}

/// Caret on the last text position inside `key`.
pub(crate) fn caret_at_end(tx: &mut Transaction, key: NodeKey) -> bool {
    let last = tx
        .state()
        .text_nodes_in(key)
        .last()
        .copied()
        .or_else(|| tx.node(key).filter(|n| n.is_text()).map(|n| n.key()));
    match last.and_then(|k| tx.state().text(k).map(|t| (k, t.text.len()))) {
        Some((text, len)) => {
            tx.set_caret(text, len);
            true
        }
        None => false,
    }
}

pub(crate) fn format_px(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}px", value as i64)
    } else {
        format!("{value}px")
    }
}
