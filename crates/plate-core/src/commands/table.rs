use crate::commands::{caret_at_end, caret_at_start};
use crate::core::{Editor, EditorError};
use crate::node::{NodeKey, NodeKind};
use crate::transaction::Transaction;

pub const MAX_TABLE_DIM: usize = 32;

/// Removes the table around the caret, or inserts a `rows` x `cols` table
/// after the caret's top-level block.
pub fn toggle_table(editor: &mut Editor, rows: usize, cols: usize) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    let rows = rows.clamp(1, MAX_TABLE_DIM);
    let cols = cols.clamp(1, MAX_TABLE_DIM);
    editor.transact_from("command:table.insert", |tx| {
        let anchor = selection.anchor.key;
        let enclosing = tx
            .state()
            .find_ancestor_or_self(anchor, |n| n.kind == NodeKind::Table);
        match enclosing {
            Some(table) => Ok(remove_table(tx, table)),
            None => {
                let Some(after) = tx.state().top_level(anchor) else {
                    return Ok(false);
                };
                Ok(insert_table(tx, after, rows, cols))
            }
        }
    })
}

fn remove_table(tx: &mut Transaction, table: NodeKey) -> bool {
    let previous = tx.state().previous_sibling(table);
    let next = tx.state().next_sibling(table);
    if !tx.remove(table) {
        return false;
    }
    let placed = match (previous, next) {
        (Some(previous), _) => caret_at_end(tx, previous),
        (None, Some(next)) => caret_at_start(tx, next),
        (None, None) => false,
    };
    if !placed {
        tx.set_selection(None);
    }
    true
}

fn insert_table(tx: &mut Transaction, after: NodeKey, rows: usize, cols: usize) -> bool {
    let table = tx.create(NodeKind::Table);
    let mut first_cell = None;
    for _ in 0..rows {
        let row = tx.create(NodeKind::TableRow);
        tx.append(table, row);
        for _ in 0..cols {
            let cell = tx.create(NodeKind::TableCell { header: false });
            let (paragraph, _) = tx.create_text_block(NodeKind::Paragraph, "");
            tx.append(cell, paragraph);
            tx.append(row, cell);
            first_cell.get_or_insert(cell);
        }
    }
    if !tx.insert_after(after, table) {
        return false;
    }
    if tx.state().next_sibling(table).is_none() {
        let (trailing, _) = tx.create_text_block(NodeKind::Paragraph, "");
        tx.insert_after(table, trailing);
    }
    if let Some(cell) = first_cell {
        caret_at_start(tx, cell);
    }
    true
}
