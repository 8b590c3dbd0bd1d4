use serde::{Deserialize, Serialize};

use crate::node::{NodeKey, TextFormat};

/// A position inside a text node, as a byte offset clamped to a char boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
}

impl Point {
    pub fn new(key: NodeKey, offset: usize) -> Self {
        Self { key, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
    /// Pending caret format. `None` inherits the format of the caret's text node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<TextFormat>,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point,
            focus: point,
            format: None,
        }
    }

    pub fn range(anchor: Point, focus: Point) -> Self {
        Self {
            anchor,
            focus,
            format: None,
        }
    }

    pub fn caret(key: NodeKey, offset: usize) -> Self {
        Self::collapsed(Point::new(key, offset))
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn points_mut(&mut self) -> [&mut Point; 2] {
        [&mut self.anchor, &mut self.focus]
    }
}
