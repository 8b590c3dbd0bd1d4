use crate::commands::isolate_selected_text;
use crate::commands::text::collapse_selection;
use crate::core::{Editor, EditorError};
use crate::node::{NodeKey, NodeKind, TextFormat};
use crate::selection::{Point, Selection};
use crate::transaction::Transaction;

/// With a range and no label the selected runs are wrapped (links already
/// there are retargeted). Otherwise a new linked run reading `label`, or the
/// url itself, is inserted at the caret.
pub fn insert_link(editor: &mut Editor, url: &str, label: Option<&str>) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    editor.transact_from("command:link.insert", |tx| {
        if !selection.is_collapsed() && label.is_none() {
            return Ok(wrap_selection(tx, &selection, url));
        }
        let Some(caret) = collapse_selection(tx, &selection) else {
            return Ok(false);
        };
        let text = label.unwrap_or(url);
        let Some(run) = insert_linked_run(tx, caret, url, text, selection.format) else {
            return Ok(false);
        };
        tx.set_caret(run, text.len());
        Ok(true)
    })
}

fn wrap_selection(tx: &mut Transaction, selection: &Selection, url: &str) -> bool {
    let runs = isolate_selected_text(tx, selection);
    let (Some(first), Some(last)) = (runs.first().copied(), runs.last().copied()) else {
        return false;
    };
    let mut open: Option<NodeKey> = None;
    for run in runs {
        let Some(parent) = tx.parent(run) else {
            continue;
        };
        if matches!(tx.node(parent).map(|n| &n.kind), Some(NodeKind::Link { .. })) {
            tx.set_kind(parent, NodeKind::Link { url: url.to_string() });
            open = None;
            continue;
        }
        let reuse = open.filter(|link| {
            tx.parent(*link) == Some(parent) && tx.state().next_sibling(*link) == Some(run)
        });
        let link = match reuse {
            Some(link) => link,
            None => {
                let link = tx.create(NodeKind::Link { url: url.to_string() });
                if !tx.insert_before(run, link) {
                    continue;
                }
                link
            }
        };
        tx.append(link, run);
        open = Some(link);
    }
    let end = tx.state().text(last).map(|t| t.text.len()).unwrap_or(0);
    tx.set_selection(Some(Selection::range(Point::new(first, 0), Point::new(last, end))));
    true
}

/// Places a `Link` holding one run at `caret`. A caret inside an existing
/// link puts the new one right after it.
fn insert_linked_run(
    tx: &mut Transaction,
    caret: Point,
    url: &str,
    text: &str,
    pending: Option<TextFormat>,
) -> Option<NodeKey> {
    let host = tx.state().text(caret.key)?.clone();
    let format = pending.unwrap_or(host.format);
    let link = tx.create(NodeKind::Link { url: url.to_string() });
    let run = tx.create_text(text, format);
    tx.append(link, run);

    let enclosing = tx
        .parent(caret.key)
        .filter(|p| matches!(tx.node(*p).map(|n| &n.kind), Some(NodeKind::Link { .. })));
    let placed = match enclosing {
        Some(outer) => tx.insert_after(outer, link),
        None if caret.offset == 0 && !host.text.is_empty() => tx.insert_before(caret.key, link),
        None => {
            if caret.offset < host.text.len() {
                tx.split_text(caret.key, caret.offset);
            }
            tx.insert_after(caret.key, link)
        }
    };
    placed.then_some(run)
}

/// Unwraps every link touched by the selection, keeping its text in place.
pub fn remove_link(editor: &mut Editor) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    editor.transact_from("command:link.remove", |tx| {
        let mut touched: Vec<NodeKey> = if selection.is_collapsed() {
            vec![selection.anchor.key]
        } else {
            tx.state()
                .selected_text_slices(&selection)
                .into_iter()
                .map(|s| s.key)
                .collect()
        };
        touched.push(selection.anchor.key);
        touched.push(selection.focus.key);

        let mut links: Vec<NodeKey> = Vec::new();
        for key in touched {
            let link = tx
                .parent(key)
                .filter(|p| matches!(tx.node(*p).map(|n| &n.kind), Some(NodeKind::Link { .. })));
            if let Some(link) = link {
                if !links.contains(&link) {
                    links.push(link);
                }
            }
        }
        for link in &links {
            unwrap_link(tx, *link);
        }
        Ok(!links.is_empty())
    })
}

fn unwrap_link(tx: &mut Transaction, link: NodeKey) {
    for child in tx.children(link) {
        tx.insert_before(link, child);
    }
    tx.remove(link);
}
