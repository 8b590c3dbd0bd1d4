use manos_plate_core::NodeKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Host-side geometry. All rects share one coordinate space (the window),
/// and so do pointer events.
pub trait LayoutProvider {
    fn surface_rect(&self) -> Option<Rect>;
    fn node_rect(&self, key: NodeKey) -> Option<Rect>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub menu_gap_px: f32,
    pub menu_width: f32,
    pub menu_height: f32,
}

impl SurfaceConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.menu_gap_px <= 0.0 {
            self.menu_gap_px = 8.0;
        }
        if self.menu_width <= 0.0 {
            self.menu_width = 160.0;
        }
        if self.menu_height <= 0.0 {
            self.menu_height = 36.0;
        }
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(s).map(Self::with_defaults)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoratorState {
    Unselected,
    Selected,
    Editing,
}

impl DecoratorState {
    pub fn as_str(self) -> &'static str {
        match self {
            DecoratorState::Unselected => "unselected",
            DecoratorState::Selected => "selected",
            DecoratorState::Editing => "editing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Active {
    key: NodeKey,
    draft: Option<Map<String, Value>>,
}

/// Which decorator, if any, is selected or being edited. There is at most one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoratorSelection {
    active: Option<Active>,
}

impl DecoratorSelection {
    pub fn state_of(&self, key: NodeKey) -> DecoratorState {
        match &self.active {
            Some(active) if active.key == key => match active.draft {
                Some(_) => DecoratorState::Editing,
                None => DecoratorState::Selected,
            },
            _ => DecoratorState::Unselected,
        }
    }

    pub fn key(&self) -> Option<NodeKey> {
        self.active.as_ref().map(|a| a.key)
    }

    /// Key of the decorator in `selected` (not `editing`).
    pub fn selected(&self) -> Option<NodeKey> {
        self.active.as_ref().filter(|a| a.draft.is_none()).map(|a| a.key)
    }

    pub fn editing(&self) -> Option<NodeKey> {
        self.active.as_ref().filter(|a| a.draft.is_some()).map(|a| a.key)
    }

    /// Selects `key` and returns the decorator it replaced. An open edit on
    /// the previous decorator is discarded.
    pub fn select(&mut self, key: NodeKey) -> Option<NodeKey> {
        let previous = self.active.replace(Active { key, draft: None });
        previous.map(|a| a.key).filter(|k| *k != key)
    }

    pub fn deselect(&mut self) -> Option<NodeKey> {
        self.active.take().map(|a| a.key)
    }

    /// `selected → editing`. No-op in any other state.
    pub fn begin_edit(&mut self) -> bool {
        match &mut self.active {
            Some(active) if active.draft.is_none() => {
                active.draft = Some(Map::new());
                true
            }
            _ => false,
        }
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: Value) -> bool {
        match self.active.as_mut().and_then(|a| a.draft.as_mut()) {
            Some(draft) => {
                draft.insert(name.into(), value);
                true
            }
            None => false,
        }
    }

    pub fn draft(&self) -> Option<&Map<String, Value>> {
        self.active.as_ref().and_then(|a| a.draft.as_ref())
    }

    /// `editing → unselected`, handing back the pending field changes.
    pub fn finish_edit(&mut self) -> Option<(NodeKey, Map<String, Value>)> {
        let active = self.active.take_if(|a| a.draft.is_some())?;
        Some((active.key, active.draft.unwrap_or_default()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    Edit,
    MoveUp,
    MoveDown,
    Delete,
}

impl MenuAction {
    pub const ALL: [MenuAction; 4] = [
        MenuAction::Edit,
        MenuAction::MoveUp,
        MenuAction::MoveDown,
        MenuAction::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MenuAction::Edit => "edit",
            MenuAction::MoveUp => "move_up",
            MenuAction::MoveDown => "move_down",
            MenuAction::Delete => "delete",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuAction::Edit => "Edit",
            MenuAction::MoveUp => "Move up",
            MenuAction::MoveDown => "Move down",
            MenuAction::Delete => "Delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuPlacement {
    Above,
    Below,
}

/// Quick-action menu for the selected decorator. `rect` is relative to the
/// surface; `origin` is the surface's top-left in window space.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatingMenu {
    pub key: NodeKey,
    pub rect: Rect,
    pub origin: (f32, f32),
    pub placement: MenuPlacement,
}

impl FloatingMenu {
    pub fn actions(&self) -> &'static [MenuAction] {
        &MenuAction::ALL
    }

    pub fn window_rect(&self) -> Rect {
        self.rect.offset(self.origin.0, self.origin.1)
    }

    /// Buttons split the menu width evenly.
    pub fn action_at(&self, x: f32, y: f32) -> Option<MenuAction> {
        let rect = self.window_rect();
        if !rect.contains(x, y) || rect.width <= 0.0 {
            return None;
        }
        let actions = self.actions();
        let slot = ((x - rect.x) / rect.width * actions.len() as f32) as usize;
        actions.get(slot.min(actions.len() - 1)).copied()
    }
}

/// Places the menu above `node`, or below it when there is no room above,
/// and keeps it horizontally inside `surface`.
pub fn position_menu(node: Rect, surface: Rect, config: &SurfaceConfig) -> (Rect, MenuPlacement) {
    let width = config.menu_width;
    let height = config.menu_height;
    let above = node.y - surface.y - config.menu_gap_px - height;
    let (y, placement) = if above >= 0.0 {
        (above, MenuPlacement::Above)
    } else {
        (node.bottom() - surface.y + config.menu_gap_px, MenuPlacement::Below)
    };
    let max_x = (surface.width - width).max(0.0);
    let x = (node.x - surface.x).clamp(0.0, max_x);
    (Rect::new(x, y, width, height), placement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SurfaceConfig {
        SurfaceConfig::default().with_defaults()
    }

    #[test]
    fn menu_sits_above_when_there_is_room() {
        let surface = Rect::new(100.0, 50.0, 600.0, 800.0);
        let node = Rect::new(120.0, 200.0, 300.0, 100.0);
        let (rect, placement) = position_menu(node, surface, &config());
        assert_eq!(placement, MenuPlacement::Above);
        assert_eq!(rect, Rect::new(20.0, 106.0, 160.0, 36.0));
    }

    #[test]
    fn menu_flips_below_and_clamps() {
        let surface = Rect::new(0.0, 0.0, 400.0, 800.0);
        let node = Rect::new(350.0, 10.0, 200.0, 50.0);
        let (rect, placement) = position_menu(node, surface, &config());
        assert_eq!(placement, MenuPlacement::Below);
        assert_eq!(rect.y, 68.0);
        assert_eq!(rect.x, 240.0);
    }

    #[test]
    fn finish_edit_only_from_editing() {
        let key: NodeKey = serde_json::from_value(serde_json::json!(3)).unwrap();
        let mut selection = DecoratorSelection::default();
        assert!(selection.finish_edit().is_none());
        selection.select(key);
        assert!(selection.finish_edit().is_none());
        assert_eq!(selection.selected(), Some(key));
        assert!(selection.begin_edit());
        assert!(selection.set_field("alt", serde_json::json!("cat")));
        let (edited, fields) = selection.finish_edit().unwrap();
        assert_eq!(edited, key);
        assert_eq!(fields["alt"], "cat");
        assert_eq!(selection.state_of(key), DecoratorState::Unselected);
    }
}
