use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::EditorError;
use crate::node::{Node, NodeKey, NodeKind};
use crate::transaction::Transaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl ImagePayload {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt: String::new(),
            width: None,
            height: None,
            caption: None,
        }
    }

    pub fn alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = alt.into();
        self
    }

    pub fn set_src(&mut self, src: impl Into<String>) {
        self.src = src.into();
    }

    pub fn set_size(&mut self, width: Option<u32>, height: Option<u32>) {
        self.width = width;
        self.height = height;
    }

    pub fn set_caption(&mut self, caption: Option<String>) {
        self.caption = caption.filter(|c| !c.trim().is_empty());
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoPayload {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default = "default_true")]
    pub controls: bool,
    #[serde(default, rename = "loop")]
    pub looped: bool,
    #[serde(default)]
    pub muted: bool,
}

impl VideoPayload {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            poster: None,
            autoplay: false,
            controls: true,
            looped: false,
            muted: false,
        }
    }

    pub fn set_src(&mut self, src: impl Into<String>) {
        self.src = src.into();
    }

    pub fn set_poster(&mut self, poster: Option<String>) {
        self.poster = poster;
    }

    /// Browsers refuse unmuted autoplay, so enabling autoplay mutes.
    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.autoplay = autoplay;
        if autoplay {
            self.muted = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl CardPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            image: None,
            link: None,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailPayload {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ThumbnailPayload {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt: String::new(),
            title: None,
            link: None,
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalloutVariant {
    #[default]
    Info,
    Warning,
    Success,
    Error,
}

impl CalloutVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            CalloutVariant::Info => "info",
            CalloutVariant::Warning => "warning",
            CalloutVariant::Success => "success",
            CalloutVariant::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalloutPayload {
    #[serde(default)]
    pub variant: CalloutVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl CalloutPayload {
    pub fn new(variant: CalloutVariant, body: impl Into<String>) -> Self {
        Self {
            variant,
            title: None,
            body: body.into(),
        }
    }
}

/// Leaf node kinds that render their own interactive surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decorator {
    Image(ImagePayload),
    Video(VideoPayload),
    Card(CardPayload),
    Thumbnail(ThumbnailPayload),
    Callout(CalloutPayload),
    HorizontalRule,
}

impl Decorator {
    pub fn image(src: impl Into<String>) -> Self {
        Decorator::Image(ImagePayload::new(src))
    }

    pub fn video(src: impl Into<String>) -> Self {
        Decorator::Video(VideoPayload::new(src))
    }

    pub fn card(title: impl Into<String>, body: impl Into<String>) -> Self {
        Decorator::Card(CardPayload::new(title, body))
    }

    pub fn thumbnail(src: impl Into<String>) -> Self {
        Decorator::Thumbnail(ThumbnailPayload::new(src))
    }

    pub fn callout(variant: CalloutVariant, body: impl Into<String>) -> Self {
        Decorator::Callout(CalloutPayload::new(variant, body))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Decorator::Image(_) => "image",
            Decorator::Video(_) => "video",
            Decorator::Card(_) => "card",
            Decorator::Thumbnail(_) => "thumbnail",
            Decorator::Callout(_) => "callout",
            Decorator::HorizontalRule => "horizontal_rule",
        }
    }

    /// Plain-text stand-in used by text extraction.
    pub fn text_content(&self) -> String {
        match self {
            Decorator::Image(img) => img.alt.clone(),
            Decorator::Video(_) | Decorator::HorizontalRule => String::new(),
            Decorator::Card(card) => format!("{}\n{}", card.title, card.body),
            Decorator::Thumbnail(t) => t.title.clone().unwrap_or_else(|| t.alt.clone()),
            Decorator::Callout(c) => c.body.clone(),
        }
    }

    /// Merges `fields` into the payload. Unknown fields are ignored; a field
    /// with the wrong shape fails the whole merge and leaves `self` untouched.
    pub fn apply_fields(&mut self, fields: &serde_json::Map<String, Value>) -> Result<(), EditorError> {
        let mut value = serde_json::to_value(&*self)
            .map_err(|err| EditorError::InvalidPayload(err.to_string()))?;
        let Some(obj) = value.as_object_mut() else {
            return Err(EditorError::InvalidPayload("payload is not an object".into()));
        };
        for (k, v) in fields {
            if k == "type" {
                continue;
            }
            obj.insert(k.clone(), v.clone());
        }
        let next: Decorator = serde_json::from_value(value)
            .map_err(|err| EditorError::InvalidPayload(err.to_string()))?;
        *self = next;
        Ok(())
    }
}

macro_rules! decorator_accessors {
    ($($variant:ident($payload:ty) => $is:ident, $as:ident, $writable:ident;)*) => {
        impl Node {
            $(
                pub fn $is(&self) -> bool {
                    matches!(self.kind, NodeKind::Decorator(Decorator::$variant(_)))
                }

                pub fn $as(&self) -> Option<&$payload> {
                    match &self.kind {
                        NodeKind::Decorator(Decorator::$variant(payload)) => Some(payload),
                        _ => None,
                    }
                }
            )*

            pub fn is_horizontal_rule(&self) -> bool {
                matches!(self.kind, NodeKind::Decorator(Decorator::HorizontalRule))
            }
        }

        impl Transaction {
            $(
                /// Copy-on-write handle to the payload; `None` for stale keys or
                /// nodes of another kind.
                pub fn $writable(&mut self, key: NodeKey) -> Option<&mut $payload> {
                    if !self.node(key).is_some_and(Node::$is) {
                        return None;
                    }
                    match &mut self.writable(key)?.kind {
                        NodeKind::Decorator(Decorator::$variant(payload)) => Some(payload),
                        _ => None,
                    }
                }
            )*
        }
    };
}

decorator_accessors! {
    Image(ImagePayload) => is_image, as_image, writable_image;
    Video(VideoPayload) => is_video, as_video, writable_video;
    Card(CardPayload) => is_card, as_card, writable_card;
    Thumbnail(ThumbnailPayload) => is_thumbnail, as_thumbnail, writable_thumbnail;
    Callout(CalloutPayload) => is_callout, as_callout, writable_callout;
}

impl Transaction {
    pub fn create_decorator(&mut self, decorator: Decorator) -> NodeKey {
        self.create(NodeKind::Decorator(decorator))
    }

    pub fn writable_decorator(&mut self, key: NodeKey) -> Option<&mut Decorator> {
        if !self.node(key).is_some_and(|n| n.kind.is_decorator()) {
            return None;
        }
        match &mut self.writable(key)?.kind {
            NodeKind::Decorator(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_fields_merges_and_keeps_kind() {
        let mut d = Decorator::image("a.png");
        let fields = serde_json::json!({ "alt": "A", "width": 320, "type": "video" });
        d.apply_fields(fields.as_object().unwrap()).unwrap();
        let Decorator::Image(img) = d else {
            panic!("kind changed");
        };
        assert_eq!(img.alt, "A");
        assert_eq!(img.width, Some(320));
        assert_eq!(img.src, "a.png");
    }

    #[test]
    fn apply_fields_rejects_bad_shape_without_mutating() {
        let mut d = Decorator::image("a.png");
        let fields = serde_json::json!({ "width": "wide" });
        assert!(d.apply_fields(fields.as_object().unwrap()).is_err());
        assert_eq!(d, Decorator::image("a.png"));
    }

    #[test]
    fn video_loop_field_is_renamed() {
        let mut v = VideoPayload::new("v.mp4");
        v.looped = true;
        let json = serde_json::to_value(Decorator::Video(v)).unwrap();
        assert_eq!(json["loop"], serde_json::json!(true));
        assert_eq!(json["type"], serde_json::json!("video"));
    }
}
