use crate::commands::{format_px, isolate_selected_text, list, selected_text_blocks};
use crate::core::{Editor, EditorError};
use crate::node::{
    NodeKind, STYLE_BACKGROUND, STYLE_COLOR, STYLE_FONT_FAMILY, STYLE_FONT_SIZE,
    STYLE_PADDING_LEFT, STYLE_TEXT_ALIGN, parse_px,
};
use crate::tracker::{Alignment, BlockType};

/// Changes every selected block to `target` in place, keeping its children.
/// List targets wrap instead.
pub fn set_block_type(editor: &mut Editor, target: BlockType) -> Result<bool, EditorError> {
    if let Some(kind) = target.list_type() {
        return list::wrap_in_list(editor, kind);
    }
    let Some(kind) = target.node_kind() else {
        return Ok(false);
    };
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    let source = format!("command:format.block:{target}");
    editor.transact_from(&source, |tx| {
        let mut changed = false;
        for block in selected_text_blocks(tx.state(), &selection) {
            let block = if tx.node(block).is_some_and(|n| n.kind == NodeKind::ListItem) {
                match list::lift_item(tx, block) {
                    Some(paragraph) => {
                        changed = true;
                        paragraph
                    }
                    None => continue,
                }
            } else {
                block
            };
            if tx.node(block).is_some_and(|n| n.kind != kind) {
                changed |= tx.set_kind(block, kind.clone());
            }
        }
        Ok(changed)
    })
}

pub fn set_alignment(editor: &mut Editor, align: Alignment) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    editor.transact_from("command:align.set", |tx| {
        let mut changed = false;
        for block in selected_text_blocks(tx.state(), &selection) {
            let current = tx.node(block).and_then(|n| n.style_value(STYLE_TEXT_ALIGN).map(str::to_string));
            if current.as_deref() == Some(align.as_str()) {
                continue;
            }
            changed |= tx.set_style(block, STYLE_TEXT_ALIGN, Some(align.as_str().to_string()));
        }
        Ok(changed)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentDirection {
    Increase,
    Decrease,
}

/// Blocks move by `indent_step_px` of padding. List items change nesting
/// level instead.
pub fn indent(editor: &mut Editor, direction: IndentDirection) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    let step = editor.config().indent_step_px;
    let max = editor.config().max_indent_px;
    let source = match direction {
        IndentDirection::Increase => "command:indent.increase",
        IndentDirection::Decrease => "command:indent.decrease",
    };
    editor.transact_from(source, |tx| {
        let mut changed = false;
        for block in selected_text_blocks(tx.state(), &selection) {
            if tx.node(block).is_some_and(|n| n.kind == NodeKind::ListItem) {
                changed |= match direction {
                    IndentDirection::Increase => list::nest_item(tx, block),
                    IndentDirection::Decrease => list::unnest_item(tx, block),
                };
                continue;
            }
            let current = tx
                .node(block)
                .and_then(|n| n.style_value(STYLE_PADDING_LEFT))
                .and_then(parse_px)
                .unwrap_or(0.0);
            let next = match direction {
                IndentDirection::Increase => (current + step).min(max),
                IndentDirection::Decrease => (current - step).max(0.0),
            };
            if next == current {
                continue;
            }
            let value = (next > 0.0).then(|| format_px(next));
            changed |= tx.set_style(block, STYLE_PADDING_LEFT, value);
        }
        Ok(changed)
    })
}

/// Inline text properties settable from the toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleProperty {
    FontFamily,
    FontSize,
    Color,
    Background,
}

impl StyleProperty {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "font-family" | "font_family" | "fontFamily" => Some(StyleProperty::FontFamily),
            "font-size" | "font_size" | "fontSize" => Some(StyleProperty::FontSize),
            "color" => Some(StyleProperty::Color),
            "background-color" | "background" | "backgroundColor" => Some(StyleProperty::Background),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StyleProperty::FontFamily => STYLE_FONT_FAMILY,
            StyleProperty::FontSize => STYLE_FONT_SIZE,
            StyleProperty::Color => STYLE_COLOR,
            StyleProperty::Background => STYLE_BACKGROUND,
        }
    }

    /// Canonical stored form, or `None` when the value is unusable.
    pub fn normalize_value(self, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match self {
            StyleProperty::FontSize => parse_px(value).filter(|v| *v > 0.0).map(format_px),
            _ => Some(value.to_string()),
        }
    }
}

/// Patches `property` on the selected text runs. A collapsed selection
/// patches the caret's block so later typing inherits it.
pub fn set_style(
    editor: &mut Editor,
    property: StyleProperty,
    value: Option<String>,
) -> Result<bool, EditorError> {
    let Some(selection) = editor.selection().cloned() else {
        return Ok(false);
    };
    let value = match value {
        Some(raw) => match property.normalize_value(&raw) {
            Some(v) => Some(v),
            None => {
                return Err(EditorError::InvalidArgument(format!(
                    "unusable {} value `{raw}`",
                    property.as_str()
                )));
            }
        },
        None => None,
    };
    editor.transact_from("command:style.set", |tx| {
        if selection.is_collapsed() {
            let Some(block) = tx
                .state()
                .nearest_block(selection.anchor.key)
                .filter(|b| tx.node(*b).is_some_and(|n| n.kind.is_text_block()))
            else {
                return Ok(false);
            };
            return Ok(tx.set_style(block, property.as_str(), value.clone()));
        }
        let pieces = isolate_selected_text(tx, &selection);
        let mut changed = false;
        for key in pieces {
            changed |= tx.set_style(key, property.as_str(), value.clone());
        }
        Ok(changed)
    })
}
