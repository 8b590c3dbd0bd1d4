use crate::core::{EditorConfig, EditorError};
use crate::node::{NodeKey, NodeKind, TextFormat};
use crate::plugin::{NormalizePass, PluginRegistry};
use crate::selection::{Point, Selection};
use crate::state::EditorState;
use crate::transaction::Transaction;

pub(crate) fn core_passes() -> Vec<Box<dyn NormalizePass>> {
    vec![
        Box::new(EnsureNonEmptyRoot),
        Box::new(RemoveEmptyContainers),
        Box::new(EnsureTextLeaf),
        Box::new(MergeAdjacentLists),
        Box::new(MergeAdjacentText),
    ]
}

/// Runs every registered pass until a full round changes nothing.
pub(crate) fn normalize(
    tx: &mut Transaction,
    registry: &PluginRegistry,
    config: &EditorConfig,
) -> Result<(), EditorError> {
    for iteration in 0..config.max_normalize_iterations {
        let mut changed = false;
        for pass in registry.normalize_passes() {
            if pass.run(tx, config) {
                tracing::trace!(pass = pass.id(), iteration, "normalize pass changed the tree");
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }
    }
    Err(EditorError::NormalizeDidNotConverge(config.max_normalize_iterations))
}

/// Clamps offsets and moves points on removed or detached nodes to the nearest
/// surviving text position.
pub(crate) fn repair_selection(tx: &mut Transaction) {
    let Some(selection) = tx.selection().cloned() else {
        return;
    };
    let state = tx.state();
    let anchor = repair_point(state, &selection.anchor);
    let focus = repair_point(state, &selection.focus);
    let repaired = match (anchor, focus) {
        (Some(anchor), Some(focus)) => Some(Selection {
            anchor,
            focus,
            format: selection.format,
        }),
        (Some(p), None) | (None, Some(p)) => Some(Selection::collapsed(p)),
        (None, None) => state.last_text_point().map(Selection::collapsed),
    };
    if repaired.as_ref() != Some(&selection) {
        tx.set_selection(repaired);
    }
}

fn repair_point(state: &EditorState, point: &Point) -> Option<Point> {
    if state.is_valid_point(point) {
        return Some(*point);
    }
    if state.is_attached(point.key) {
        if let Some(text) = state.text(point.key) {
            let offset = crate::node::clamp_to_char_boundary(&text.text, point.offset);
            return Some(Point::new(point.key, offset));
        }
    }
    None
}

fn attached_elements(tx: &Transaction) -> Vec<NodeKey> {
    tx.state().keys_in_order()
}

struct EnsureNonEmptyRoot;

impl NormalizePass for EnsureNonEmptyRoot {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_root"
    }

    fn run(&self, tx: &mut Transaction, _config: &EditorConfig) -> bool {
        let root = tx.root();
        if !tx.children(root).is_empty() {
            return false;
        }
        let (paragraph, _) = tx.create_text_block(NodeKind::Paragraph, "");
        tx.append(root, paragraph)
    }
}

struct EnsureTextLeaf;

impl NormalizePass for EnsureTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_leaf"
    }

    fn run(&self, tx: &mut Transaction, _config: &EditorConfig) -> bool {
        let mut changed = false;
        for key in attached_elements(tx) {
            let Some(node) = tx.node(key) else {
                continue;
            };
            let needs_text = node.kind.is_text_block()
                && !node
                    .children()
                    .iter()
                    .any(|c| tx.node(*c).is_some_and(|n| n.kind.is_inline()));
            let empty_cell =
                matches!(node.kind, NodeKind::TableCell { .. }) && node.children().is_empty();
            if needs_text {
                let text = tx.create_text("", TextFormat::EMPTY);
                changed |= tx.insert_at(key, 0, text);
            } else if empty_cell {
                let (paragraph, _) = tx.create_text_block(NodeKind::Paragraph, "");
                changed |= tx.append(key, paragraph);
            }
        }
        changed
    }
}

struct RemoveEmptyContainers;

impl NormalizePass for RemoveEmptyContainers {
    fn id(&self) -> &'static str {
        "core.remove_empty_containers"
    }

    fn run(&self, tx: &mut Transaction, _config: &EditorConfig) -> bool {
        let doomed: Vec<NodeKey> = attached_elements(tx)
            .into_iter()
            .filter(|k| {
                tx.node(*k).is_some_and(|n| {
                    n.children().is_empty()
                        && matches!(
                            n.kind,
                            NodeKind::List(_) | NodeKind::Link { .. } | NodeKind::Table | NodeKind::TableRow
                        )
                })
            })
            .collect();
        let mut changed = false;
        for key in doomed {
            changed |= tx.remove(key);
        }
        changed
    }
}

struct MergeAdjacentLists;

impl NormalizePass for MergeAdjacentLists {
    fn id(&self) -> &'static str {
        "list.merge_adjacent"
    }

    fn run(&self, tx: &mut Transaction, _config: &EditorConfig) -> bool {
        let mut changed = false;
        for key in attached_elements(tx) {
            let Some(NodeKind::List(kind)) = tx.node(key).map(|n| n.kind.clone()) else {
                continue;
            };
            let Some(next) = tx.state().next_sibling(key) else {
                continue;
            };
            let same_kind = tx
                .node(next)
                .is_some_and(|n| n.kind == NodeKind::List(kind));
            if !same_kind {
                continue;
            }
            for item in tx.children(next) {
                tx.append(key, item);
            }
            changed |= tx.remove(next);
        }
        changed
    }
}

struct MergeAdjacentText;

impl NormalizePass for MergeAdjacentText {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text"
    }

    fn run(&self, tx: &mut Transaction, _config: &EditorConfig) -> bool {
        let mut changed = false;
        for parent in attached_elements(tx) {
            if tx.node(parent).is_none_or(|n| n.kind.is_leaf()) {
                continue;
            }
            changed |= drop_empty_runs(tx, parent);
            changed |= merge_equal_runs(tx, parent);
        }
        changed
    }
}

fn drop_empty_runs(tx: &mut Transaction, parent: NodeKey) -> bool {
    let children = tx.children(parent);
    if children.len() < 2 {
        return false;
    }
    let mut changed = false;
    for (ix, key) in children.iter().enumerate() {
        if tx.state().text(*key).is_none_or(|t| !t.text.is_empty()) {
            continue;
        }
        let has_other_inline = tx.children(parent).iter().any(|c| {
            c != key && tx.node(*c).is_some_and(|n| n.kind.is_inline())
        });
        if !has_other_inline {
            continue;
        }
        let left = ix
            .checked_sub(1)
            .and_then(|i| children.get(i))
            .and_then(|k| tx.state().text(*k).map(|t| (*k, t.text.len())));
        let right = children.get(ix + 1).filter(|k| tx.state().text(**k).is_some());
        let holds_point = tx
            .selection()
            .is_some_and(|s| s.anchor.key == *key || s.focus.key == *key);
        match (left, right) {
            (Some((left, len)), _) => tx.remap_points(*key, left, len),
            (None, Some(right)) => tx.remap_points(*key, *right, 0),
            (None, None) if holds_point => continue,
            (None, None) => {}
        }
        changed |= tx.remove(*key);
    }
    changed
}

fn merge_equal_runs(tx: &mut Transaction, parent: NodeKey) -> bool {
    let mut changed = false;
    let children = tx.children(parent);
    let mut current: Option<NodeKey> = None;
    for key in children {
        let Some(node) = tx.node(key) else {
            continue;
        };
        let Some(text) = node.as_text() else {
            current = None;
            continue;
        };
        let Some(left) = current else {
            current = Some(key);
            continue;
        };
        let mergeable = tx.node(left).is_some_and(|l| {
            l.style == node.style && l.as_text().is_some_and(|lt| lt.format == text.format)
        });
        if !mergeable {
            current = Some(key);
            continue;
        }
        let right_text = text.text.clone();
        let Some(mut merged) = tx.state().text(left).map(|t| t.text.clone()) else {
            continue;
        };
        let left_len = merged.len();
        merged.push_str(&right_text);
        tx.set_text(left, merged);
        tx.remap_points(key, left, left_len);
        tx.remove(key);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TextFormatType;

    fn run_all(tx: &mut Transaction) {
        let registry = PluginRegistry::core();
        let config = EditorConfig::default().with_defaults();
        normalize(tx, &registry, &config).unwrap();
    }

    #[test]
    fn merges_equal_runs_and_remaps_caret() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let root = tx.root();
        let paragraph = tx.children(root)[0];
        let first = tx.children(paragraph)[0];
        tx.set_text(first, "ab");
        let second = tx.create_text("cd", TextFormat::EMPTY);
        tx.append(paragraph, second);
        tx.set_caret(second, 1);
        run_all(&mut tx);
        assert_eq!(tx.children(paragraph), vec![first]);
        assert_eq!(tx.state().text(first).unwrap().text, "abcd");
        assert_eq!(tx.selection().unwrap().anchor, Point::new(first, 3));
    }

    #[test]
    fn keeps_runs_with_different_formats() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let root = tx.root();
        let paragraph = tx.children(root)[0];
        let first = tx.children(paragraph)[0];
        tx.set_text(first, "ab");
        let bold = TextFormat::EMPTY.with(TextFormatType::Bold, true);
        let second = tx.create_text("cd", bold);
        tx.append(paragraph, second);
        run_all(&mut tx);
        assert_eq!(tx.children(paragraph).len(), 2);
    }

    #[test]
    fn empty_root_and_cells_are_filled() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        tx.clear_root();
        let table = tx.create(NodeKind::Table);
        let row = tx.create(NodeKind::TableRow);
        let cell = tx.create(NodeKind::TableCell { header: false });
        tx.append(row, cell);
        tx.append(table, row);
        let root = tx.root();
        tx.append(root, table);
        run_all(&mut tx);
        assert_eq!(tx.state().text_nodes().len(), 1);
        assert!(tx.node(cell).unwrap().children().len() == 1);
    }

    #[test]
    fn adjacent_lists_of_same_kind_merge() {
        let state = EditorState::empty();
        let mut tx = Transaction::new(&state, None);
        let root = tx.root();
        let mut lists = Vec::new();
        for label in ["a", "b"] {
            let list = tx.create(NodeKind::List(crate::node::ListType::Bullet));
            let (item, _) = tx.create_text_block(NodeKind::ListItem, label);
            tx.append(list, item);
            tx.append(root, list);
            lists.push(list);
        }
        run_all(&mut tx);
        assert!(tx.node(lists[1]).is_none());
        assert_eq!(tx.children(lists[0]).len(), 2);
    }
}
