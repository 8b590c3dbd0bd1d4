use crate::commands::{caret_at_end, caret_at_start, list};
use crate::core::{Editor, EditorError};
use crate::node::{NodeKey, NodeKind, TextFormat, clamp_to_char_boundary};
use crate::selection::{Point, Selection};
use crate::state::EditorState;
use crate::transaction::Transaction;

pub fn insert_text(editor: &mut Editor, text: &str) -> Result<bool, EditorError> {
    if text.is_empty() {
        return Ok(false);
    }
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    editor.transact_from("command:text.insert", |tx| {
        let Some(caret) = collapse_selection(tx, &selection) else {
            return Ok(false);
        };
        let Some(point) = insert_at_point(tx, caret, text, selection.format) else {
            return Ok(false);
        };
        tx.set_selection(Some(Selection::collapsed(point)));
        Ok(true)
    })
}

pub fn delete_backward(editor: &mut Editor) -> Result<bool, EditorError> {
    delete(editor, Direction::Backward)
}

pub fn delete_forward(editor: &mut Editor) -> Result<bool, EditorError> {
    delete(editor, Direction::Forward)
}

/// Splits the block at the caret. Headings continue as paragraphs, code
/// blocks take a newline, and an empty list item leaves the list.
pub fn insert_paragraph(editor: &mut Editor) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    editor.transact_from("command:text.insert_paragraph", |tx| {
        let Some(caret) = collapse_selection(tx, &selection) else {
            return Ok(false);
        };
        Ok(split_block(tx, caret))
    })
}

/// Inserts multi-line text as one edit: every `\n` splits the block the way
/// Enter does. A `\r` before the break is dropped.
pub fn paste_text(editor: &mut Editor, text: &str) -> Result<bool, EditorError> {
    if text.is_empty() {
        return Ok(false);
    }
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    editor.transact_from("command:text.paste", |tx| {
        let Some(mut caret) = collapse_selection(tx, &selection) else {
            return Ok(false);
        };
        let mut changed = false;
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                if !split_block(tx, caret) {
                    return Err(EditorError::Aborted("paste target cannot be split".into()));
                }
                let Some(next) = tx.selection().map(|s| s.anchor) else {
                    return Err(EditorError::Aborted("paste lost the caret".into()));
                };
                caret = next;
                changed = true;
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let Some(point) = insert_at_point(tx, caret, line, selection.format) else {
                return Err(EditorError::Aborted("paste target cannot hold text".into()));
            };
            tx.set_selection(Some(Selection::collapsed(point)));
            caret = point;
            changed = true;
        }
        Ok(changed)
    })
}

/// Body of [`insert_paragraph`]. Leaves the caret where typing continues.
fn split_block(tx: &mut Transaction, caret: Point) -> bool {
    let Some(block) = tx.state().nearest_block(caret.key) else {
        return false;
    };
    let Some(kind) = tx.node(block).map(|n| n.kind.clone()) else {
        return false;
    };
    match kind {
        NodeKind::Decorator(_) => return false,
        NodeKind::Code { .. } => {
            let point = insert_at_point(tx, caret, "\n", None);
            tx.set_selection(point.map(Selection::collapsed));
            return point.is_some();
        }
        NodeKind::ListItem if is_empty_item(tx.state(), block) => {
            let Some(paragraph) = list::lift_item(tx, block) else {
                return false;
            };
            caret_at_start(tx, paragraph);
            return true;
        }
        _ => {}
    }

    let at_start = caret.offset == 0
        && tx.state().text_nodes_in(block).first() == Some(&caret.key)
        && !tx.state().text_content(block).is_empty();
    if at_start {
        let before_kind = match kind {
            NodeKind::ListItem => NodeKind::ListItem,
            _ => NodeKind::Paragraph,
        };
        let (before, _) = tx.create_text_block(before_kind, "");
        tx.set_caret(caret.key, 0);
        return tx.insert_before(block, before);
    }

    let next_kind = match kind {
        NodeKind::Heading(_) => NodeKind::Paragraph,
        other => other,
    };
    let next = tx.create(next_kind);
    if let Some(style) = tx.node(block).map(|n| n.style.clone()) {
        tx.replace_style(next, style);
    }
    if !tx.insert_after(block, next) {
        return false;
    }

    let Some(host) = child_of(tx.state(), block, caret.key) else {
        return false;
    };
    let Some(host_ix) = tx.state().index_in_parent(host) else {
        return false;
    };
    let first_moved = if host != caret.key {
        host_ix + 1
    } else if caret.offset == 0 {
        host_ix
    } else {
        tx.split_text(caret.key, caret.offset);
        host_ix + 1
    };
    let moved: Vec<NodeKey> = tx.children(block).into_iter().skip(first_moved).collect();
    for child in moved {
        tx.append(next, child);
    }

    let has_inline = tx
        .children(next)
        .iter()
        .any(|c| tx.node(*c).is_some_and(|n| n.kind.is_inline()));
    if !has_inline {
        let text = tx.create_text("", TextFormat::EMPTY);
        tx.insert_at(next, 0, text);
    }
    caret_at_start(tx, next);
    true
}

pub fn select_all(editor: &mut Editor) -> Result<bool, EditorError> {
    let range = editor.read(|state| Some((state.first_text_point()?, state.last_text_point()?)));
    let Some((start, end)) = range else {
        return Ok(false);
    };
    Ok(editor.set_selection(Some(Selection::range(start, end))))
}

/// Deletes a non-collapsed selection and returns the resulting caret. A
/// collapsed selection is returned unchanged.
pub(crate) fn collapse_selection(tx: &mut Transaction, selection: &Selection) -> Option<Point> {
    if selection.is_collapsed() {
        return tx
            .state()
            .is_valid_point(&selection.anchor)
            .then_some(selection.anchor);
    }
    delete_range(tx, selection)
}

/// Inserts `text` at `point`. A pending format different from the host run's
/// format gets a run of its own.
pub(crate) fn insert_at_point(
    tx: &mut Transaction,
    point: Point,
    text: &str,
    pending: Option<TextFormat>,
) -> Option<Point> {
    let data = tx.state().text(point.key)?.clone();
    let offset = clamp_to_char_boundary(&data.text, point.offset);
    match pending.filter(|f| *f != data.format) {
        None => {
            let mut next = data.text;
            next.insert_str(offset, text);
            tx.set_text(point.key, next);
            Some(Point::new(point.key, offset + text.len()))
        }
        Some(format) => {
            let run = tx.create_text(text, format);
            if let Some(style) = tx.node(point.key).map(|n| n.style.clone()) {
                tx.replace_style(run, style);
            }
            let placed = if offset == 0 && !data.text.is_empty() {
                tx.insert_before(point.key, run)
            } else {
                if offset < data.text.len() {
                    tx.split_text(point.key, offset);
                }
                tx.insert_after(point.key, run)
            };
            placed.then(|| Point::new(run, text.len()))
        }
    }
}

/// Removes everything between the selection's points. Blocks fully inside
/// the range are removed and the last block's remainder joins the first.
pub(crate) fn delete_range(tx: &mut Transaction, selection: &Selection) -> Option<Point> {
    let state = tx.state();
    if !state.is_valid_point(&selection.anchor) || !state.is_valid_point(&selection.focus) {
        return None;
    }
    let (start, end) = state.ordered_points(selection);
    if start.key == end.key {
        let mut text = state.text(start.key)?.text.clone();
        text.replace_range(start.offset..end.offset, "");
        tx.set_text(start.key, text);
        return Some(start);
    }

    let texts = state.text_nodes();
    let first = texts.iter().position(|k| *k == start.key)?;
    let last = texts.iter().position(|k| *k == end.key)?;
    let between: Vec<NodeKey> = texts.get(first + 1..last).unwrap_or_default().to_vec();
    let start_block = state.nearest_block(start.key)?;
    let end_block = state.nearest_block(end.key)?;

    let order = state.keys_in_order();
    let pos_start = order.iter().position(|k| *k == start_block)?;
    let pos_end = order.iter().position(|k| *k == end_block)?;
    let doomed_blocks: Vec<NodeKey> = order
        .get(pos_start + 1..pos_end)
        .unwrap_or_default()
        .iter()
        .copied()
        .filter(|k| {
            state
                .node(*k)
                .is_some_and(|n| n.kind.is_text_block() || n.kind.is_decorator())
                && !state.is_ancestor_or_self(*k, end_block)
        })
        .collect();

    let head = state.text(start.key)?.text[..start.offset].to_string();
    let tail = state.text(end.key)?.text[end.offset..].to_string();

    tx.set_text(start.key, head);
    tx.set_text(end.key, tail);
    for key in between {
        tx.remove(key);
    }
    for key in doomed_blocks {
        tx.remove(key);
    }
    if start_block != end_block {
        merge_blocks(tx, start_block, end_block);
    }
    Some(start)
}

/// Moves `source`'s inline content to the end of `target` and drops `source`
/// once it is empty. Nested lists follow only into a list item.
pub(crate) fn merge_blocks(tx: &mut Transaction, target: NodeKey, source: NodeKey) -> bool {
    let target_is_item = tx.node(target).is_some_and(|n| n.kind == NodeKind::ListItem);
    let both_text = [target, source]
        .iter()
        .all(|k| tx.node(*k).is_some_and(|n| n.kind.is_text_block()));
    if !both_text || target == source {
        return false;
    }
    for child in tx.children(source) {
        let inline = tx.node(child).is_some_and(|n| n.kind.is_inline());
        if inline || target_is_item {
            tx.append(target, child);
        }
    }
    if tx.children(source).is_empty() {
        tx.remove(source);
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

fn delete(editor: &mut Editor, direction: Direction) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    let source = match direction {
        Direction::Backward => "command:text.delete_backward",
        Direction::Forward => "command:text.delete_forward",
    };
    editor.transact_from(source, |tx| {
        if !selection.is_collapsed() {
            let Some(point) = delete_range(tx, &selection) else {
                return Ok(false);
            };
            tx.set_selection(Some(Selection::collapsed(point)));
            return Ok(true);
        }
        let caret = selection.anchor;
        let Some(text) = tx.state().text(caret.key).map(|t| t.text.clone()) else {
            return Ok(false);
        };
        match direction {
            Direction::Backward if caret.offset > 0 => {
                let start = prev_char_boundary(&text, caret.offset);
                remove_span(tx, caret.key, &text, start, caret.offset);
                tx.set_caret(caret.key, start);
                Ok(true)
            }
            Direction::Forward if caret.offset < text.len() => {
                let end = next_char_boundary(&text, caret.offset);
                remove_span(tx, caret.key, &text, caret.offset, end);
                tx.set_caret(caret.key, caret.offset);
                Ok(true)
            }
            _ => Ok(delete_across_boundary(tx, caret, direction)),
        }
    })
}

fn delete_across_boundary(tx: &mut Transaction, caret: Point, direction: Direction) -> bool {
    let Some(block) = tx.state().nearest_block(caret.key) else {
        return false;
    };

    if let Some(sibling) = adjacent_text_in_block(tx.state(), caret.key, block, direction) {
        let Some(text) = tx.state().text(sibling).map(|t| t.text.clone()) else {
            return false;
        };
        if text.is_empty() {
            return tx.remove(sibling);
        }
        return match direction {
            Direction::Backward => {
                let start = prev_char_boundary(&text, text.len());
                remove_span(tx, sibling, &text, start, text.len());
                tx.set_caret(sibling, start);
                true
            }
            Direction::Forward => {
                let end = next_char_boundary(&text, 0);
                remove_span(tx, sibling, &text, 0, end);
                true
            }
        };
    }

    if direction == Direction::Backward && tx.node(block).is_some_and(|n| n.kind == NodeKind::ListItem) {
        return match list::lift_item(tx, block) {
            Some(paragraph) => caret_at_start(tx, paragraph),
            None => false,
        };
    }

    match adjacent_block(tx.state(), block, direction) {
        Some(neighbour) if tx.node(neighbour).is_some_and(|n| n.kind.is_decorator()) => {
            tx.remove(neighbour)
        }
        Some(neighbour) => match direction {
            Direction::Backward => {
                caret_at_end(tx, neighbour);
                merge_blocks(tx, neighbour, block)
            }
            Direction::Forward => merge_blocks(tx, block, neighbour),
        },
        None if direction == Direction::Backward => {
            let is_plain = tx
                .node(block)
                .is_none_or(|n| matches!(n.kind, NodeKind::Paragraph));
            !is_plain && tx.set_kind(block, NodeKind::Paragraph)
        }
        None => false,
    }
}

fn remove_span(tx: &mut Transaction, key: NodeKey, text: &str, start: usize, end: usize) {
    let mut next = text.to_string();
    next.replace_range(start..end, "");
    tx.set_text(key, next);
}

fn prev_char_boundary(s: &str, ix: usize) -> usize {
    s[..ix].char_indices().next_back().map(|(i, _)| i).unwrap_or(0)
}

fn next_char_boundary(s: &str, ix: usize) -> usize {
    s[ix..].chars().next().map(|c| ix + c.len_utf8()).unwrap_or(s.len())
}

/// The child of `block` that is `key` or contains it.
fn child_of(state: &EditorState, block: NodeKey, key: NodeKey) -> Option<NodeKey> {
    std::iter::once(key)
        .chain(state.ancestors(key))
        .find(|k| state.parent(*k) == Some(block))
}

fn is_empty_item(state: &EditorState, item: NodeKey) -> bool {
    state.children(item).iter().all(|c| {
        state
            .node(*c)
            .is_some_and(|n| n.as_text().is_some_and(|t| t.text.is_empty()))
    })
}

fn adjacent_text_in_block(
    state: &EditorState,
    key: NodeKey,
    block: NodeKey,
    direction: Direction,
) -> Option<NodeKey> {
    let texts = state.text_nodes_in(block);
    let ix = texts.iter().position(|k| *k == key)?;
    let candidate = match direction {
        Direction::Backward => ix.checked_sub(1).and_then(|i| texts.get(i)),
        Direction::Forward => texts.get(ix + 1),
    }?;
    // A nested list's text belongs to another block.
    (state.nearest_block(*candidate) == Some(block)).then_some(*candidate)
}

/// Previous or next block in document order that shares `block`'s table cell,
/// skipping `block`'s own ancestors and descendants.
fn adjacent_block(state: &EditorState, block: NodeKey, direction: Direction) -> Option<NodeKey> {
    let order = state.keys_in_order();
    let pos = order.iter().position(|k| *k == block)?;
    let is_block = |k: &NodeKey| {
        state
            .node(*k)
            .is_some_and(|n| n.kind.is_text_block() || n.kind.is_decorator())
            && !state.is_ancestor_or_self(*k, block)
            && !state.is_ancestor_or_self(block, *k)
    };
    let found = match direction {
        Direction::Backward => order[..pos].iter().rev().find(|k| is_block(k)).copied(),
        Direction::Forward => order[pos + 1..].iter().find(|k| is_block(k)).copied(),
    }?;
    (enclosing_cell(state, found) == enclosing_cell(state, block)).then_some(found)
}

fn enclosing_cell(state: &EditorState, key: NodeKey) -> Option<NodeKey> {
    state.find_ancestor_or_self(key, |n| matches!(n.kind, NodeKind::TableCell { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_boundaries_respect_utf8() {
        let s = "aé";
        assert_eq!(prev_char_boundary(s, s.len()), 1);
        assert_eq!(next_char_boundary(s, 1), 3);
        assert_eq!(next_char_boundary(s, 3), 3);
    }
}
