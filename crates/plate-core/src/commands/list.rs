use crate::commands::selected_text_blocks;
use crate::core::{Editor, EditorError};
use crate::node::{ListType, NodeKey, NodeKind};
use crate::transaction::Transaction;

/// Unwraps the selected items when they all sit in a `kind` list, otherwise
/// wraps the selected blocks into one.
pub fn toggle_list(editor: &mut Editor, kind: ListType) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    let source = format!("command:list.toggle:{}", kind.as_str());
    editor.transact_from(&source, |tx| {
        let blocks = selected_text_blocks(tx.state(), &selection);
        if blocks.is_empty() {
            return Ok(false);
        }
        let all_in_kind = blocks.iter().all(|b| list_type_of_item(tx, *b) == Some(kind));
        if all_in_kind {
            let mut changed = false;
            for item in blocks {
                changed |= lift_item(tx, item).is_some();
            }
            return Ok(changed);
        }
        Ok(wrap_blocks(tx, &blocks, kind))
    })
}

/// Wraps the selected blocks in a `kind` list without ever unwrapping.
pub fn wrap_in_list(editor: &mut Editor, kind: ListType) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    let source = format!("command:format.block:{}", kind.as_str());
    editor.transact_from(&source, |tx| {
        let blocks = selected_text_blocks(tx.state(), &selection);
        Ok(wrap_blocks(tx, &blocks, kind))
    })
}

fn list_type_of_item(tx: &Transaction, item: NodeKey) -> Option<ListType> {
    if tx.node(item)?.kind != NodeKind::ListItem {
        return None;
    }
    match tx.node(tx.parent(item)?)?.kind {
        NodeKind::List(kind) => Some(kind),
        _ => None,
    }
}

/// List items get their list retyped; other blocks become items of a new
/// list placed where the first of a run of sibling blocks was.
pub(crate) fn wrap_blocks(tx: &mut Transaction, blocks: &[NodeKey], kind: ListType) -> bool {
    let mut changed = false;
    let mut open_list: Option<NodeKey> = None;
    for &block in blocks {
        let Some(node) = tx.node(block) else {
            continue;
        };
        if node.kind == NodeKind::ListItem {
            open_list = None;
            if let Some(list) = tx.parent(block) {
                if tx.node(list).is_some_and(|n| n.kind != NodeKind::List(kind)) {
                    changed |= tx.set_kind(list, NodeKind::List(kind));
                }
            }
            continue;
        }
        let style = node.style.clone();

        let item = tx.create(NodeKind::ListItem);
        tx.replace_style(item, style);
        for child in tx.children(block) {
            tx.append(item, child);
        }
        let list = match open_list.filter(|l| tx.state().next_sibling(*l) == Some(block)) {
            Some(list) => list,
            None => {
                let list = tx.create(NodeKind::List(kind));
                if !tx.insert_before(block, list) {
                    continue;
                }
                list
            }
        };
        tx.append(list, item);
        tx.remove(block);
        open_list = Some(list);
        changed = true;
    }
    changed
}

/// Turns a list item into a paragraph right after its list. Items after it
/// (and its own nested items) move into a new list after the paragraph.
/// Nested items are first lifted to the top level.
pub(crate) fn lift_item(tx: &mut Transaction, item: NodeKey) -> Option<NodeKey> {
    while is_nested(tx, item) {
        if !unnest_item(tx, item) {
            return None;
        }
    }
    let list = tx.parent(item)?;
    let NodeKind::List(kind) = tx.node(list)?.kind else {
        return None;
    };

    let paragraph = tx.create(NodeKind::Paragraph);
    if let Some(style) = tx.node(item).map(|n| n.style.clone()) {
        tx.replace_style(paragraph, style);
    }
    let mut carried = Vec::new();
    for child in tx.children(item) {
        if tx.node(child).is_some_and(|n| matches!(n.kind, NodeKind::List(_))) {
            carried.extend(tx.children(child));
        } else {
            tx.append(paragraph, child);
        }
    }
    carried.extend(following_siblings(tx, item));

    tx.insert_after(list, paragraph);
    if !carried.is_empty() {
        let tail = tx.create(NodeKind::List(kind));
        tx.insert_after(paragraph, tail);
        for key in carried {
            tx.append(tail, key);
        }
    }
    tx.remove(item);
    Some(paragraph)
}

/// Moves `item` into a nested list at the end of its previous sibling.
pub(crate) fn nest_item(tx: &mut Transaction, item: NodeKey) -> bool {
    let Some(previous) = tx.state().previous_sibling(item) else {
        return false;
    };
    let Some(NodeKind::List(kind)) = tx.parent(item).and_then(|l| tx.node(l)).map(|n| n.kind.clone())
    else {
        return false;
    };
    let trailing = tx
        .children(previous)
        .last()
        .copied()
        .filter(|k| tx.node(*k).is_some_and(|n| matches!(n.kind, NodeKind::List(_))));
    let nested = match trailing {
        Some(nested) => nested,
        None => {
            let nested = tx.create(NodeKind::List(kind));
            tx.append(previous, nested);
            nested
        }
    };
    tx.append(nested, item)
}

/// Moves a nested `item` up one level, right after the item that contained
/// it. Later siblings become `item`'s own nested list.
pub(crate) fn unnest_item(tx: &mut Transaction, item: NodeKey) -> bool {
    if !is_nested(tx, item) {
        return false;
    }
    let Some(list) = tx.parent(item) else {
        return false;
    };
    let Some(parent_item) = tx.parent(list) else {
        return false;
    };
    let Some(NodeKind::List(kind)) = tx.node(list).map(|n| n.kind.clone()) else {
        return false;
    };
    let following = following_siblings(tx, item);
    if !following.is_empty() {
        let sub = tx.create(NodeKind::List(kind));
        tx.append(item, sub);
        for key in following {
            tx.append(sub, key);
        }
    }
    tx.insert_after(parent_item, item)
}

fn is_nested(tx: &Transaction, item: NodeKey) -> bool {
    tx.parent(item)
        .and_then(|list| tx.parent(list))
        .and_then(|p| tx.node(p))
        .is_some_and(|n| n.kind == NodeKind::ListItem)
}

fn following_siblings(tx: &Transaction, key: NodeKey) -> Vec<NodeKey> {
    let Some(parent) = tx.parent(key) else {
        return Vec::new();
    };
    tx.children(parent)
        .into_iter()
        .skip_while(|k| *k != key)
        .skip(1)
        .collect()
}
