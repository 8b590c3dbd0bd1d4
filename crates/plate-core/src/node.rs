use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::decorator::Decorator;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity. Keys are handed out from a monotonically
/// increasing counter and are never reused, even after the node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(u64);

impl NodeKey {
    pub(crate) fn next() -> Self {
        NodeKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inline CSS-like properties, ordered so serialization is stable.
pub type Style = BTreeMap<String, String>;

pub const STYLE_FONT_FAMILY: &str = "font-family";
pub const STYLE_FONT_SIZE: &str = "font-size";
pub const STYLE_COLOR: &str = "color";
pub const STYLE_BACKGROUND: &str = "background-color";
pub const STYLE_TEXT_ALIGN: &str = "text-align";
pub const STYLE_PADDING_LEFT: &str = "padding-left";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFormatType {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Subscript,
    Superscript,
}

impl TextFormatType {
    pub const ALL: [TextFormatType; 7] = [
        TextFormatType::Bold,
        TextFormatType::Italic,
        TextFormatType::Underline,
        TextFormatType::Strikethrough,
        TextFormatType::Code,
        TextFormatType::Subscript,
        TextFormatType::Superscript,
    ];

    fn bit(self) -> u8 {
        match self {
            TextFormatType::Bold => 1,
            TextFormatType::Italic => 1 << 1,
            TextFormatType::Strikethrough => 1 << 2,
            TextFormatType::Underline => 1 << 3,
            TextFormatType::Code => 1 << 4,
            TextFormatType::Subscript => 1 << 5,
            TextFormatType::Superscript => 1 << 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextFormatType::Bold => "bold",
            TextFormatType::Italic => "italic",
            TextFormatType::Underline => "underline",
            TextFormatType::Strikethrough => "strikethrough",
            TextFormatType::Code => "code",
            TextFormatType::Subscript => "subscript",
            TextFormatType::Superscript => "superscript",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for TextFormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitset of [`TextFormatType`] flags. Serialized as the raw number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextFormat(u8);

impl TextFormat {
    pub const EMPTY: TextFormat = TextFormat(0);
    const MASK: u8 = 0b0111_1111;

    pub fn from_bits(bits: u8) -> Self {
        TextFormat(bits & Self::MASK)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn has(self, format: TextFormatType) -> bool {
        self.0 & format.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sub- and superscript are mutually exclusive.
    pub fn with(self, format: TextFormatType, on: bool) -> Self {
        let mut bits = self.0;
        if on {
            bits |= format.bit();
            match format {
                TextFormatType::Subscript => bits &= !TextFormatType::Superscript.bit(),
                TextFormatType::Superscript => bits &= !TextFormatType::Subscript.bit(),
                _ => {}
            }
        } else {
            bits &= !format.bit();
        }
        TextFormat(bits)
    }

    pub fn toggled(self, format: TextFormatType) -> Self {
        self.with(format, !self.has(format))
    }

    pub fn intersect(self, other: TextFormat) -> Self {
        TextFormat(self.0 & other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = TextFormatType> {
        TextFormatType::ALL.into_iter().filter(move |f| self.has(*f))
    }
}

impl FromIterator<TextFormatType> for TextFormat {
    fn from_iter<I: IntoIterator<Item = TextFormatType>>(iter: I) -> Self {
        iter.into_iter()
            .fold(TextFormat::EMPTY, |acc, f| acc.with(f, true))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListType {
    Bullet,
    Number,
}

impl ListType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListType::Bullet => "bullet",
            ListType::Number => "number",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "bullet" | "ul" | "unordered" => Some(ListType::Bullet),
            "number" | "ol" | "ordered" => Some(ListType::Number),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextData {
    pub text: String,
    pub format: TextFormat,
}

impl TextData {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::EMPTY,
        }
    }

    pub fn with_format(mut self, format: TextFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Text(TextData),
    Paragraph,
    Heading(u8),
    List(ListType),
    ListItem,
    Quote,
    Code { language: Option<String> },
    Link { url: String },
    Table,
    TableRow,
    TableCell { header: bool },
    Decorator(Decorator),
}

impl NodeKind {
    pub fn text(text: impl Into<String>) -> Self {
        NodeKind::Text(TextData::new(text))
    }

    pub fn heading(level: u8) -> Self {
        NodeKind::Heading(level.clamp(1, 6))
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Text(_) => "text",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading(_) => "heading",
            NodeKind::List(_) => "list",
            NodeKind::ListItem => "list_item",
            NodeKind::Quote => "quote",
            NodeKind::Code { .. } => "code",
            NodeKind::Link { .. } => "link",
            NodeKind::Table => "table",
            NodeKind::TableRow => "table_row",
            NodeKind::TableCell { .. } => "table_cell",
            NodeKind::Decorator(d) => d.kind_name(),
        }
    }

    /// Text and decorator kinds never own children.
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Text(_) | NodeKind::Decorator(_))
    }

    pub fn is_element(&self) -> bool {
        !self.is_leaf()
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, NodeKind::Text(_) | NodeKind::Link { .. })
    }

    /// Blocks whose children are inline runs.
    pub fn is_text_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph
                | NodeKind::Heading(_)
                | NodeKind::Quote
                | NodeKind::Code { .. }
                | NodeKind::ListItem
        )
    }

    pub fn is_decorator(&self) -> bool {
        matches!(self, NodeKind::Decorator(_))
    }

    /// Structural nesting rules used by import validation and the HTML
    /// converter. Transactions only enforce the leaf rule.
    pub fn can_contain(&self, child: &NodeKind) -> bool {
        match self {
            NodeKind::Root | NodeKind::TableCell { .. } => matches!(
                child,
                NodeKind::Paragraph
                    | NodeKind::Heading(_)
                    | NodeKind::List(_)
                    | NodeKind::Quote
                    | NodeKind::Code { .. }
                    | NodeKind::Table
                    | NodeKind::Decorator(_)
            ),
            NodeKind::Paragraph | NodeKind::Heading(_) | NodeKind::Quote | NodeKind::Code { .. } => {
                child.is_inline()
            }
            NodeKind::ListItem => child.is_inline() || matches!(child, NodeKind::List(_)),
            NodeKind::List(_) => matches!(child, NodeKind::ListItem),
            NodeKind::Link { .. } => matches!(child, NodeKind::Text(_)),
            NodeKind::Table => matches!(child, NodeKind::TableRow),
            NodeKind::TableRow => matches!(child, NodeKind::TableCell { .. }),
            NodeKind::Text(_) | NodeKind::Decorator(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    key: NodeKey,
    pub kind: NodeKind,
    pub(crate) children: Vec<NodeKey>,
    pub style: Style,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            key: NodeKey::next(),
            kind,
            children: Vec::new(),
            style: Style::new(),
        }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn as_text(&self) -> Option<&TextData> {
        match &self.kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn as_text_mut(&mut self) -> Option<&mut TextData> {
        match &mut self.kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_decorator(&self) -> Option<&Decorator> {
        match &self.kind {
            NodeKind::Decorator(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    pub fn style_value(&self, property: &str) -> Option<&str> {
        self.style.get(property).map(String::as_str)
    }
}

pub(crate) fn parse_px(value: &str) -> Option<f32> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    number.parse::<f32>().ok().filter(|v| v.is_finite())
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}
