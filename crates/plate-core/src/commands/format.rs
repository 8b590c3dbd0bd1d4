use crate::commands::isolate_selected_text;
use crate::core::{Editor, EditorError};
use crate::node::TextFormatType;
use crate::selection::Selection;

/// Toggles `format` uniformly: if every selected run already has it, it is
/// cleared everywhere, otherwise set everywhere. A collapsed selection only
/// flips the pending caret format.
pub fn toggle_format(editor: &mut Editor, format: TextFormatType) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    let source = format!("command:format.{format}");
    editor.transact_from(&source, |tx| {
        if selection.is_collapsed() {
            let current = selection
                .format
                .or_else(|| tx.state().text(selection.anchor.key).map(|t| t.format));
            let Some(current) = current else {
                return Ok(false);
            };
            tx.set_selection(Some(Selection {
                format: Some(current.toggled(format)),
                ..selection.clone()
            }));
            return Ok(true);
        }

        let slices = tx.state().selected_text_slices(&selection);
        if slices.is_empty() {
            return Ok(false);
        }
        let all_on = slices
            .iter()
            .all(|s| tx.state().text(s.key).is_some_and(|t| t.format.has(format)));
        for key in isolate_selected_text(tx, &selection) {
            if let Some(current) = tx.state().text(key).map(|t| t.format) {
                tx.set_format(key, current.with(format, !all_on));
            }
        }
        Ok(true)
    })
}
