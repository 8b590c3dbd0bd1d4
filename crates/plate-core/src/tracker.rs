use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::EditorConfig;
use crate::node::{
    ListType, NodeKey, NodeKind, STYLE_BACKGROUND, STYLE_COLOR, STYLE_FONT_FAMILY, STYLE_FONT_SIZE,
    STYLE_TEXT_ALIGN, TextFormat, parse_px,
};
use crate::selection::Selection;
use crate::state::EditorState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BlockType {
    Paragraph,
    Heading(u8),
    Quote,
    Code,
    Bullet,
    Number,
    TableCell,
}

impl BlockType {
    pub fn parse(name: &str) -> Option<Self> {
        let block = match name {
            "paragraph" | "p" => BlockType::Paragraph,
            "quote" | "blockquote" => BlockType::Quote,
            "code" => BlockType::Code,
            "bullet" | "ul" => BlockType::Bullet,
            "number" | "ol" => BlockType::Number,
            "table_cell" => BlockType::TableCell,
            _ => {
                let level = name.strip_prefix('h')?.parse::<u8>().ok()?;
                if !(1..=6).contains(&level) {
                    return None;
                }
                BlockType::Heading(level)
            }
        };
        Some(block)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading(1) => "h1",
            BlockType::Heading(2) => "h2",
            BlockType::Heading(3) => "h3",
            BlockType::Heading(4) => "h4",
            BlockType::Heading(5) => "h5",
            BlockType::Heading(_) => "h6",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
            BlockType::Bullet => "bullet",
            BlockType::Number => "number",
            BlockType::TableCell => "table_cell",
        }
    }

    pub fn list_type(self) -> Option<ListType> {
        match self {
            BlockType::Bullet => Some(ListType::Bullet),
            BlockType::Number => Some(ListType::Number),
            _ => None,
        }
    }

    /// Element kind for the non-list block types.
    pub fn node_kind(self) -> Option<NodeKind> {
        match self {
            BlockType::Paragraph => Some(NodeKind::Paragraph),
            BlockType::Heading(level) => Some(NodeKind::heading(level)),
            BlockType::Quote => Some(NodeKind::Quote),
            BlockType::Code => Some(NodeKind::Code { language: None }),
            BlockType::Bullet | BlockType::Number | BlockType::TableCell => None,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BlockType> for String {
    fn from(value: BlockType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for BlockType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BlockType::parse(&value).ok_or_else(|| format!("unknown block type `{value}`"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "left" | "start" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" | "end" => Some(Alignment::Right),
            "justify" => Some(Alignment::Justify),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "justify",
        }
    }
}

pub const DEFAULT_COLOR: &str = "#000000";
pub const DEFAULT_BACKGROUND: &str = "transparent";

/// What the toolbar shows for the current selection. `None` on a style
/// property means the range mixes several values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionAttributes {
    pub formats: TextFormat,
    pub block_type: BlockType,
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub color: Option<String>,
    pub background: Option<String>,
    pub alignment: Option<Alignment>,
    pub link: Option<String>,
    pub decorator: Option<NodeKey>,
    pub collapsed: bool,
}

impl SelectionAttributes {
    /// Attributes of a caret in an empty paragraph.
    pub fn defaults(config: &EditorConfig) -> Self {
        Self {
            formats: TextFormat::EMPTY,
            block_type: BlockType::Paragraph,
            font_family: Some(config.default_font_family.clone()),
            font_size: Some(config.default_font_size),
            color: Some(DEFAULT_COLOR.to_string()),
            background: Some(DEFAULT_BACKGROUND.to_string()),
            alignment: Some(Alignment::Left),
            link: None,
            decorator: None,
            collapsed: true,
        }
    }
}

/// Default font size in px for the block a text node lives in.
pub fn default_font_size(kind: &NodeKind, config: &EditorConfig) -> f32 {
    match kind {
        NodeKind::Heading(1) => 32.0,
        NodeKind::Heading(2) => 24.0,
        NodeKind::Heading(3) => 19.0,
        NodeKind::Heading(4) => 16.0,
        NodeKind::Heading(5) => 13.0,
        NodeKind::Heading(_) => 11.0,
        _ => config.default_font_size,
    }
}

pub fn resolve_selection(
    state: &EditorState,
    selection: Option<&Selection>,
    config: &EditorConfig,
) -> SelectionAttributes {
    let Some(selection) = selection else {
        return SelectionAttributes::defaults(config);
    };
    let anchor = selection.anchor.key;
    let collapsed = selection.is_collapsed();

    let slices = if collapsed {
        Vec::new()
    } else {
        state.selected_text_slices(selection)
    };
    let sampled: Vec<NodeKey> = if slices.is_empty() {
        vec![anchor]
    } else {
        slices.iter().map(|s| s.key).collect()
    };

    let formats = if collapsed || slices.is_empty() {
        selection
            .format
            .or_else(|| state.text(anchor).map(|t| t.format))
            .unwrap_or_default()
    } else {
        slices
            .iter()
            .filter_map(|s| state.text(s.key).map(|t| t.format))
            .reduce(TextFormat::intersect)
            .unwrap_or_default()
    };

    let font_family = uniform(&sampled, |key| {
        inherited_style(state, key, STYLE_FONT_FAMILY)
            .unwrap_or_else(|| config.default_font_family.clone())
    });
    let font_size = uniform(&sampled, |key| {
        inherited_style(state, key, STYLE_FONT_SIZE)
            .and_then(|v| parse_px(&v))
            .unwrap_or_else(|| {
                state
                    .nearest_block(key)
                    .and_then(|b| state.node(b))
                    .map(|n| default_font_size(&n.kind, config))
                    .unwrap_or(config.default_font_size)
            })
            .to_bits()
    })
    .map(f32::from_bits);
    let color = uniform(&sampled, |key| {
        inherited_style(state, key, STYLE_COLOR).unwrap_or_else(|| DEFAULT_COLOR.to_string())
    });
    let background = uniform(&sampled, |key| {
        inherited_style(state, key, STYLE_BACKGROUND)
            .unwrap_or_else(|| DEFAULT_BACKGROUND.to_string())
    });
    let alignment = uniform(&sampled, |key| {
        inherited_style(state, key, STYLE_TEXT_ALIGN)
            .and_then(|v| Alignment::parse(&v))
            .unwrap_or_default()
    });

    let link = state
        .find_ancestor_or_self(anchor, |n| matches!(n.kind, NodeKind::Link { .. }))
        .and_then(|k| match &state.node(k)?.kind {
            NodeKind::Link { url } => Some(url.clone()),
            _ => None,
        });
    let decorator = state
        .node(anchor)
        .filter(|n| n.kind.is_decorator())
        .map(|n| n.key());

    SelectionAttributes {
        formats,
        block_type: block_type_at(state, anchor),
        font_family,
        font_size,
        color,
        background,
        alignment,
        link,
        decorator,
        collapsed,
    }
}

/// Walks up from `key`. A paragraph directly under the root stops the walk;
/// one inside a table cell reports the cell.
pub fn block_type_at(state: &EditorState, key: NodeKey) -> BlockType {
    let chain = std::iter::once(key).chain(state.ancestors(key));
    for k in chain {
        let Some(node) = state.node(k) else {
            break;
        };
        match &node.kind {
            NodeKind::ListItem => {
                return match state.parent(k).and_then(|p| state.node(p)).map(|n| &n.kind) {
                    Some(NodeKind::List(ListType::Number)) => BlockType::Number,
                    _ => BlockType::Bullet,
                };
            }
            NodeKind::Heading(level) => return BlockType::Heading(*level),
            NodeKind::Quote => return BlockType::Quote,
            NodeKind::Code { .. } => return BlockType::Code,
            NodeKind::TableCell { .. } => return BlockType::TableCell,
            NodeKind::Paragraph if state.parent(k) == Some(state.root()) => {
                return BlockType::Paragraph;
            }
            _ => {}
        }
    }
    BlockType::Paragraph
}

/// Inline style on the node, else the nearest ancestor that sets it.
fn inherited_style(state: &EditorState, key: NodeKey, property: &str) -> Option<String> {
    std::iter::once(key)
        .chain(state.ancestors(key))
        .find_map(|k| state.node(k)?.style_value(property).map(str::to_string))
}

fn uniform<T: PartialEq>(keys: &[NodeKey], mut value: impl FnMut(NodeKey) -> T) -> Option<T> {
    let mut iter = keys.iter().map(|k| value(*k));
    let first = iter.next()?;
    for other in iter {
        if other != first {
            return None;
        }
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_type_names_round_trip() {
        for name in ["paragraph", "h1", "h6", "quote", "code", "bullet", "number"] {
            assert_eq!(BlockType::parse(name).map(BlockType::as_str), Some(name));
        }
        assert_eq!(BlockType::parse("h7"), None);
    }

    #[test]
    fn heading_defaults_follow_the_scale() {
        let config = EditorConfig::default().with_defaults();
        assert_eq!(default_font_size(&NodeKind::heading(1), &config), 32.0);
        assert_eq!(default_font_size(&NodeKind::heading(3), &config), 19.0);
        assert_eq!(default_font_size(&NodeKind::Paragraph, &config), 16.0);
    }

    #[test]
    fn no_selection_reports_defaults() {
        let state = EditorState::empty();
        let config = EditorConfig::default().with_defaults();
        let attrs = resolve_selection(&state, None, &config);
        assert_eq!(attrs, SelectionAttributes::defaults(&config));
    }
}
