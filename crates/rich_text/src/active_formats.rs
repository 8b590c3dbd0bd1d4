//! Reducer behind the toolbar's active-state: which format buttons are lit
//! and what the block, font and color controls display.

use manos_plate_core::{
    Alignment, BlockType, EditorConfig, NodeKey, SelectionAttributes, TextFormat, TextFormatType,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolbarError {
    #[error("unknown format: {0}")]
    UnknownFormat(String),
    #[error("unknown toolbar action: {0}")]
    UnknownAction(String),
    #[error("invalid toolbar action: {0}")]
    InvalidAction(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolbarAction {
    Activate(TextFormatType),
    Deactivate(TextFormatType),
    Toggle(TextFormatType),
    /// Replaces the whole active set.
    SetAll(TextFormat),
    Clear,
    /// Mirrors a freshly resolved selection into every control.
    Sync(SelectionAttributes),
    SetHistory { can_undo: bool, can_redo: bool },
}

impl ToolbarAction {
    /// Builds an action from its wire form, e.g.
    /// `{"type": "toggle", "format": "bold"}` or
    /// `{"type": "set_all", "formats": ["bold", "italic"]}`.
    pub fn from_json(value: &Value) -> Result<Self, ToolbarError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolbarError::InvalidAction("missing type".to_string()))?;
        let format = || -> Result<TextFormatType, ToolbarError> {
            let name = value
                .get("format")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolbarError::InvalidAction(format!("{kind} needs a format")))?;
            parse_format(name)
        };
        match kind {
            "activate" => Ok(Self::Activate(format()?)),
            "deactivate" => Ok(Self::Deactivate(format()?)),
            "toggle" => Ok(Self::Toggle(format()?)),
            "set_all" => {
                let names = value
                    .get("formats")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ToolbarError::InvalidAction("set_all needs formats".to_string()))?;
                let mut formats = TextFormat::EMPTY;
                for name in names {
                    let name = name
                        .as_str()
                        .ok_or_else(|| ToolbarError::InvalidAction("format names are strings".to_string()))?;
                    formats = formats.with(parse_format(name)?, true);
                }
                Ok(Self::SetAll(formats))
            }
            "clear" => Ok(Self::Clear),
            other => Err(ToolbarError::UnknownAction(other.to_string())),
        }
    }
}

pub fn parse_format(name: &str) -> Result<TextFormatType, ToolbarError> {
    TextFormatType::parse(name).ok_or_else(|| ToolbarError::UnknownFormat(name.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolbarState {
    pub formats: TextFormat,
    pub block_type: BlockType,
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub color: Option<String>,
    pub background: Option<String>,
    pub alignment: Option<Alignment>,
    pub link: Option<String>,
    pub decorator: Option<NodeKey>,
    pub can_undo: bool,
    pub can_redo: bool,
}

impl ToolbarState {
    pub fn new(config: &EditorConfig) -> Self {
        Self::from_attributes(SelectionAttributes::defaults(config))
    }

    fn from_attributes(attrs: SelectionAttributes) -> Self {
        Self {
            formats: attrs.formats,
            block_type: attrs.block_type,
            font_family: attrs.font_family,
            font_size: attrs.font_size,
            color: attrs.color,
            background: attrs.background,
            alignment: attrs.alignment,
            link: attrs.link,
            decorator: attrs.decorator,
            can_undo: false,
            can_redo: false,
        }
    }

    pub fn is_active(&self, format: TextFormatType) -> bool {
        self.formats.has(format)
    }
}

pub struct DispatchResult {
    pub state_changed: bool,
}

type Subscriber = Box<dyn FnMut(&ToolbarState)>;

pub struct ToolbarStore {
    state: ToolbarState,
    subscribers: Vec<Subscriber>,
}

impl ToolbarStore {
    pub fn new(state: ToolbarState) -> Self {
        Self {
            state,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> &ToolbarState {
        &self.state
    }

    pub fn subscribe(&mut self, f: impl FnMut(&ToolbarState) + 'static) {
        self.subscribers.push(Box::new(f));
    }

    pub fn dispatch(&mut self, action: ToolbarAction) -> DispatchResult {
        let next = match action {
            ToolbarAction::Activate(format) => self.with_formats(self.state.formats.with(format, true)),
            ToolbarAction::Deactivate(format) => self.with_formats(self.state.formats.with(format, false)),
            ToolbarAction::Toggle(format) => self.with_formats(self.state.formats.toggled(format)),
            ToolbarAction::SetAll(formats) => self.with_formats(formats),
            ToolbarAction::Clear => self.with_formats(TextFormat::EMPTY),
            ToolbarAction::Sync(attrs) => {
                let mut next = ToolbarState::from_attributes(attrs);
                next.can_undo = self.state.can_undo;
                next.can_redo = self.state.can_redo;
                next
            }
            ToolbarAction::SetHistory { can_undo, can_redo } => ToolbarState {
                can_undo,
                can_redo,
                ..self.state.clone()
            },
        };
        if next == self.state {
            return DispatchResult {
                state_changed: false,
            };
        }
        self.state = next;
        for subscriber in self.subscribers.iter_mut() {
            subscriber(&self.state);
        }
        DispatchResult {
            state_changed: true,
        }
    }

    fn with_formats(&self, formats: TextFormat) -> ToolbarState {
        ToolbarState {
            formats,
            ..self.state.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ToolbarStore {
        ToolbarStore::new(ToolbarState::new(&EditorConfig::default().with_defaults()))
    }

    #[test]
    fn incremental_actions_only_touch_their_format() {
        let mut store = store();
        assert!(store.dispatch(ToolbarAction::Activate(TextFormatType::Bold)).state_changed);
        assert!(!store.dispatch(ToolbarAction::Activate(TextFormatType::Bold)).state_changed);
        store.dispatch(ToolbarAction::Toggle(TextFormatType::Italic));
        assert!(store.state().is_active(TextFormatType::Bold));
        assert!(store.state().is_active(TextFormatType::Italic));
        store.dispatch(ToolbarAction::Deactivate(TextFormatType::Bold));
        assert!(!store.state().is_active(TextFormatType::Bold));
        store.dispatch(ToolbarAction::Clear);
        assert!(store.state().formats.is_empty());
    }

    #[test]
    fn wire_actions_reject_unknown_formats() {
        let err = ToolbarAction::from_json(&serde_json::json!({ "type": "toggle", "format": "blink" }));
        assert_eq!(err, Err(ToolbarError::UnknownFormat("blink".to_string())));
        let err = ToolbarAction::from_json(&serde_json::json!({ "type": "explode" }));
        assert!(matches!(err, Err(ToolbarError::UnknownAction(_))));
    }
}
