//! Renders the document into the DOM-like tree the host mounts. Text blocks
//! reuse the HTML exporter; decorators get their interactive shell, and the
//! one being edited gets its form.

use manos_plate_core::dom::{DomElement, DomNode};
use manos_plate_core::html::tree_to_dom;
use manos_plate_core::{Decorator, EditorState, NodeKey, NodeKind, NodeTree};
use serde_json::{Map, Value};

use crate::decorator_menu::{DecoratorSelection, DecoratorState, FloatingMenu};

pub fn render_document(state: &EditorState, selection: &DecoratorSelection) -> Vec<DomNode> {
    let mut out = Vec::new();
    for &key in state.children(state.root()) {
        let Some(node) = state.node(key) else {
            continue;
        };
        if let Some(decorator) = node.as_decorator() {
            out.push(render_decorator(key, decorator, selection.state_of(key), selection.draft()).into_node());
            continue;
        }
        let Some(block) = NodeTree::from_state(state, key) else {
            continue;
        };
        let wrapper = NodeTree::new(NodeKind::Root).with_children(vec![block]);
        for mut dom in tree_to_dom(&wrapper) {
            if let DomNode::Element(el) = &mut dom {
                el.set_attribute("data-key", key.to_string());
            }
            out.push(dom);
        }
    }
    out
}

/// Shell around a decorator's content. `draft` only matters while editing.
pub fn render_decorator(
    key: NodeKey,
    decorator: &Decorator,
    state: DecoratorState,
    draft: Option<&Map<String, Value>>,
) -> DomElement {
    let mut shell = DomElement::new("div")
        .attr("class", format!("plate-decorator plate-{}", decorator.kind_name()))
        .attr("data-key", key.to_string())
        .attr("data-state", state.as_str())
        .attr("contenteditable", "false");
    shell.push(decorator_body(decorator).into_node());
    if state == DecoratorState::Editing {
        shell.push(edit_form(decorator, draft).into_node());
    }
    shell
}

fn decorator_body(decorator: &Decorator) -> DomElement {
    match decorator {
        Decorator::Image(img) => {
            let mut el = DomElement::new("img")
                .attr("src", img.src.clone())
                .attr("alt", img.alt.clone());
            if let Some(width) = img.width {
                el = el.attr("width", width.to_string());
            }
            if let Some(height) = img.height {
                el = el.attr("height", height.to_string());
            }
            let mut figure = DomElement::new("figure").child(el.into_node());
            if let Some(caption) = &img.caption {
                figure.push(DomElement::new("figcaption").text(caption.clone()).into_node());
            }
            figure
        }
        Decorator::Video(video) => {
            let mut el = DomElement::new("video").attr("src", video.src.clone());
            if let Some(poster) = &video.poster {
                el = el.attr("poster", poster.clone());
            }
            for (flag, name) in [
                (video.controls, "controls"),
                (video.autoplay, "autoplay"),
                (video.looped, "loop"),
                (video.muted, "muted"),
            ] {
                if flag {
                    el = el.attr(name, "");
                }
            }
            el
        }
        Decorator::Card(card) => {
            let mut body = DomElement::new("div").attr("class", "card");
            if let Some(image) = &card.image {
                body.push(DomElement::new("img").attr("src", image.clone()).into_node());
            }
            body.push(DomElement::new("h4").text(card.title.clone()).into_node());
            body.push(DomElement::new("p").text(card.body.clone()).into_node());
            match &card.link {
                Some(link) => DomElement::new("a").attr("href", link.clone()).child(body.into_node()),
                None => body,
            }
        }
        Decorator::Thumbnail(thumb) => {
            let mut img = DomElement::new("img")
                .attr("class", "thumbnail")
                .attr("src", thumb.src.clone())
                .attr("alt", thumb.alt.clone());
            if let Some(title) = &thumb.title {
                img = img.attr("title", title.clone());
            }
            match &thumb.link {
                Some(link) => DomElement::new("a").attr("href", link.clone()).child(img.into_node()),
                None => img,
            }
        }
        Decorator::Callout(callout) => {
            let mut aside = DomElement::new("aside")
                .attr("class", format!("callout callout-{}", callout.variant.as_str()));
            if let Some(title) = &callout.title {
                aside.push(DomElement::new("strong").text(title.clone()).into_node());
            }
            aside.child(DomElement::new("p").text(callout.body.clone()).into_node())
        }
        Decorator::HorizontalRule => DomElement::new("hr"),
    }
}

fn editable_fields(decorator: &Decorator) -> &'static [&'static str] {
    match decorator {
        Decorator::Image(_) => &["src", "alt", "width", "height", "caption"],
        Decorator::Video(_) => &["src", "poster", "autoplay", "controls", "loop", "muted"],
        Decorator::Card(_) => &["title", "body", "image", "link"],
        Decorator::Thumbnail(_) => &["src", "alt", "title", "link", "width", "height"],
        Decorator::Callout(_) => &["variant", "title", "body"],
        Decorator::HorizontalRule => &[],
    }
}

fn edit_form(decorator: &Decorator, draft: Option<&Map<String, Value>>) -> DomElement {
    let current = serde_json::to_value(decorator).unwrap_or(Value::Null);
    let mut form = DomElement::new("form").attr("class", "plate-decorator-form");
    for &field in editable_fields(decorator) {
        let value = draft
            .and_then(|d| d.get(field))
            .or_else(|| current.get(field))
            .unwrap_or(&Value::Null);
        let input = match value {
            Value::Bool(checked) => {
                let el = DomElement::new("input").attr("type", "checkbox").attr("name", field);
                if *checked { el.attr("checked", "") } else { el }
            }
            Value::Null => DomElement::new("input").attr("name", field).attr("value", ""),
            Value::String(s) => DomElement::new("input").attr("name", field).attr("value", s.clone()),
            other => DomElement::new("input").attr("name", field).attr("value", other.to_string()),
        };
        form.push(
            DomElement::new("label")
                .text(field)
                .child(input.into_node())
                .into_node(),
        );
    }
    for action in ["save", "cancel"] {
        form.push(
            DomElement::new("button")
                .attr("type", "button")
                .attr("data-action", action)
                .text(action)
                .into_node(),
        );
    }
    form
}

pub fn render_menu(menu: &FloatingMenu) -> DomElement {
    let style = format!(
        "left: {}px; top: {}px; width: {}px; height: {}px",
        menu.rect.x, menu.rect.y, menu.rect.width, menu.rect.height
    );
    let placement = match menu.placement {
        crate::decorator_menu::MenuPlacement::Above => "above",
        crate::decorator_menu::MenuPlacement::Below => "below",
    };
    let mut el = DomElement::new("div")
        .attr("class", "plate-floating-menu")
        .attr("data-key", menu.key.to_string())
        .attr("data-placement", placement)
        .attr("style", style);
    for action in menu.actions() {
        el.push(
            DomElement::new("button")
                .attr("type", "button")
                .attr("data-action", action.as_str())
                .text(action.label())
                .into_node(),
        );
    }
    el
}
