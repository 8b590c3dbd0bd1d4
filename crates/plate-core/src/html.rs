//! HTML conversion in both directions, built on [`crate::dom`].
//!
//! Decorators export as elements tagged with `data-node` and carrying their
//! whole payload in `data-payload`, so an exported document imports back
//! with its decorators intact. Everything else is best effort.
use crate::decorator::{Decorator, ImagePayload, VideoPayload};
use crate::dom::{self, DomElement, DomNode};
use crate::fragment::NodeTree;
use crate::node::{
    ListType, NodeKind, STYLE_BACKGROUND, STYLE_COLOR, STYLE_FONT_FAMILY, STYLE_FONT_SIZE,
    STYLE_PADDING_LEFT, STYLE_TEXT_ALIGN, Style, TextFormat, TextFormatType,
};

const KNOWN_STYLES: [&str; 6] = [
    STYLE_FONT_FAMILY,
    STYLE_FONT_SIZE,
    STYLE_COLOR,
    STYLE_BACKGROUND,
    STYLE_TEXT_ALIGN,
    STYLE_PADDING_LEFT,
];

pub fn style_attribute(style: &Style) -> String {
    style
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parses an inline `style` attribute, keeping the properties the model
/// knows about.
pub fn parse_style_attribute(value: &str) -> Style {
    value
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let k = k.trim().to_ascii_lowercase();
            let v = v.trim();
            (KNOWN_STYLES.contains(&k.as_str()) && !v.is_empty()).then(|| (k, v.to_string()))
        })
        .collect()
}

fn with_style(el: DomElement, style: &Style) -> DomElement {
    if style.is_empty() {
        el
    } else {
        el.attr("style", style_attribute(style))
    }
}

// ---- export ----

/// Converts the children of a root tree to DOM nodes.
pub fn tree_to_dom(root: &NodeTree) -> Vec<DomNode> {
    root.children.iter().map(block_to_dom).collect()
}

pub fn tree_to_html(root: &NodeTree) -> String {
    dom::serialize(&tree_to_dom(root))
}

fn block_to_dom(tree: &NodeTree) -> DomNode {
    let el = match &tree.kind {
        NodeKind::Paragraph => inline_container("p", tree),
        NodeKind::Heading(level) => inline_container(&format!("h{level}"), tree),
        NodeKind::Quote => inline_container("blockquote", tree),
        NodeKind::ListItem => {
            let mut li = with_style(DomElement::new("li"), &tree.style);
            for child in &tree.children {
                match child.kind {
                    NodeKind::List(_) => li.push(block_to_dom(child)),
                    _ => li.children.extend(inline_to_dom(child)),
                }
            }
            li
        }
        NodeKind::List(kind) => {
            let tag = match kind {
                ListType::Bullet => "ul",
                ListType::Number => "ol",
            };
            let mut list = with_style(DomElement::new(tag), &tree.style);
            for item in &tree.children {
                list.push(block_to_dom(item));
            }
            list
        }
        NodeKind::Code { language } => {
            let mut code = DomElement::new("code").text(tree.text_content());
            let mut pre = DomElement::new("pre");
            if let Some(lang) = language {
                code = code.attr("class", format!("language-{lang}"));
                pre = pre.attr("data-language", lang.clone());
            }
            with_style(pre, &tree.style).child(code.into_node())
        }
        NodeKind::Table => {
            let mut table = with_style(DomElement::new("table"), &tree.style);
            for row in &tree.children {
                let mut tr = DomElement::new("tr");
                for cell in &row.children {
                    let tag = match cell.kind {
                        NodeKind::TableCell { header: true } => "th",
                        _ => "td",
                    };
                    let mut td = with_style(DomElement::new(tag), &cell.style);
                    for block in &cell.children {
                        td.push(block_to_dom(block));
                    }
                    tr.push(td.into_node());
                }
                table.push(tr.into_node());
            }
            table
        }
        NodeKind::Decorator(decorator) => decorator_to_dom(decorator),
        _ => {
            let mut div = DomElement::new("div");
            for child in &tree.children {
                div.push(block_to_dom(child));
            }
            div
        }
    };
    el.into_node()
}

fn inline_container(tag: &str, tree: &NodeTree) -> DomElement {
    let mut el = with_style(DomElement::new(tag), &tree.style);
    for child in &tree.children {
        el.children.extend(inline_to_dom(child));
    }
    el
}

fn inline_to_dom(tree: &NodeTree) -> Option<DomNode> {
    match &tree.kind {
        NodeKind::Text(t) => {
            if t.text.is_empty() {
                return None;
            }
            let mut node = DomNode::Text(t.text.clone());
            for (format, tag) in [
                (TextFormatType::Code, "code"),
                (TextFormatType::Subscript, "sub"),
                (TextFormatType::Superscript, "sup"),
                (TextFormatType::Strikethrough, "s"),
                (TextFormatType::Underline, "u"),
                (TextFormatType::Italic, "em"),
                (TextFormatType::Bold, "strong"),
            ] {
                if t.format.has(format) {
                    node = DomElement::new(tag).child(node).into_node();
                }
            }
            if !tree.style.is_empty() {
                node = with_style(DomElement::new("span"), &tree.style)
                    .child(node)
                    .into_node();
            }
            Some(node)
        }
        NodeKind::Link { url } => {
            let mut a = DomElement::new("a").attr("href", url.clone());
            for child in &tree.children {
                a.children.extend(inline_to_dom(child));
            }
            Some(a.into_node())
        }
        _ => None,
    }
}

fn decorator_to_dom(decorator: &Decorator) -> DomElement {
    let payload = serde_json::to_string(decorator).unwrap_or_default();
    let tagged = |el: DomElement| {
        el.attr("data-node", decorator.kind_name())
            .attr("data-payload", payload.clone())
    };
    match decorator {
        Decorator::Image(img) => {
            let mut figure = tagged(DomElement::new("figure")).child(image_element(img).into_node());
            if let Some(caption) = &img.caption {
                figure.push(DomElement::new("figcaption").text(caption.clone()).into_node());
            }
            figure
        }
        Decorator::Video(video) => {
            let mut el = tagged(DomElement::new("video"))
                .attr("src", video.src.clone())
                .attr("controls", "");
            if let Some(poster) = &video.poster {
                el = el.attr("poster", poster.clone());
            }
            el
        }
        Decorator::Card(card) => tagged(DomElement::new("div").attr("class", "card"))
            .child(DomElement::new("h4").text(card.title.clone()).into_node())
            .child(DomElement::new("p").text(card.body.clone()).into_node()),
        Decorator::Thumbnail(thumb) => {
            let mut img = DomElement::new("img")
                .attr("src", thumb.src.clone())
                .attr("alt", thumb.alt.clone());
            if let Some(title) = &thumb.title {
                img = img.attr("title", title.clone());
            }
            tagged(DomElement::new("figure").attr("class", "thumbnail")).child(img.into_node())
        }
        Decorator::Callout(callout) => tagged(
            DomElement::new("aside").attr("class", format!("callout callout-{}", callout.variant.as_str())),
        )
        .text(callout.body.clone()),
        Decorator::HorizontalRule => tagged(DomElement::new("hr")),
    }
}

fn image_element(img: &ImagePayload) -> DomElement {
    let mut el = DomElement::new("img")
        .attr("src", img.src.clone())
        .attr("alt", img.alt.clone());
    if let Some(width) = img.width {
        el = el.attr("width", width.to_string());
    }
    if let Some(height) = img.height {
        el = el.attr("height", height.to_string());
    }
    el
}

// ---- import ----

/// Input starting with a tag is treated as markup.
pub fn looks_like_html(input: &str) -> bool {
    let trimmed = input.trim_start();
    trimmed.starts_with('<')
        && trimmed[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '!' || c == '/')
}

/// Converts an HTML fragment into a root tree. `None` when nothing usable
/// came out of it.
pub fn html_to_tree(input: &str) -> Option<NodeTree> {
    let nodes = dom::parse_fragment(input);
    let blocks = blocks_from_dom(&nodes);
    if blocks.is_empty() {
        return None;
    }
    Some(NodeTree::new(NodeKind::Root).with_children(blocks))
}

fn blocks_from_dom(nodes: &[DomNode]) -> Vec<NodeTree> {
    let mut blocks = Vec::new();
    let mut pending: Vec<DomNode> = Vec::new();
    for node in nodes {
        let block = match node {
            DomNode::Element(el) if is_block_element(el) => Some(el),
            _ => None,
        };
        match block {
            Some(el) => {
                flush_inline(&mut pending, &mut blocks);
                blocks.extend(block_from_element(el));
            }
            None => pending.push(node.clone()),
        }
    }
    flush_inline(&mut pending, &mut blocks);
    blocks
}

fn flush_inline(pending: &mut Vec<DomNode>, blocks: &mut Vec<NodeTree>) {
    if pending.is_empty() {
        return;
    }
    let runs = trim_runs(inline_from_dom(pending, TextFormat::EMPTY, &Style::new()));
    pending.clear();
    if !runs.is_empty() {
        blocks.push(NodeTree::new(NodeKind::Paragraph).with_children(runs));
    }
}

fn is_block_element(el: &DomElement) -> bool {
    el.attribute("data-node").is_some()
        || matches!(
            el.name.as_str(),
            "p" | "div"
                | "h1"
                | "h2"
                | "h3"
                | "h4"
                | "h5"
                | "h6"
                | "ul"
                | "ol"
                | "li"
                | "blockquote"
                | "pre"
                | "table"
                | "hr"
                | "img"
                | "figure"
                | "video"
                | "aside"
                | "section"
                | "article"
                | "main"
                | "header"
                | "footer"
                | "nav"
                | "body"
                | "html"
        )
}

fn block_from_element(el: &DomElement) -> Vec<NodeTree> {
    if let Some(decorator) = decorator_from_element(el) {
        return vec![NodeTree::new(NodeKind::Decorator(decorator))];
    }
    let style = el
        .attribute("style")
        .map(parse_style_attribute)
        .unwrap_or_default();
    let block_style: Style = style
        .iter()
        .filter(|(k, _)| *k == STYLE_TEXT_ALIGN || *k == STYLE_PADDING_LEFT)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let text_block = |kind: NodeKind| {
        NodeTree::new(kind)
            .with_style(block_style.clone())
            .with_children(text_block_children(&el.children))
    };
    match el.name.as_str() {
        "p" => vec![text_block(NodeKind::Paragraph)],
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = el.name[1..].parse::<u8>().unwrap_or(1);
            vec![text_block(NodeKind::heading(level))]
        }
        "blockquote" => vec![text_block(NodeKind::Quote)],
        "pre" => {
            let code_child = el.elements().find(|c| c.name == "code");
            let language = el
                .attribute("data-language")
                .map(str::to_string)
                .or_else(|| {
                    code_child
                        .and_then(|c| c.attribute("class"))
                        .and_then(|class| {
                            class
                                .split_whitespace()
                                .find_map(|c| c.strip_prefix("language-"))
                                .map(str::to_string)
                        })
                });
            let text = el.text_content();
            let text = text.strip_suffix('\n').unwrap_or(&text);
            vec![NodeTree::text_block(NodeKind::Code { language }, text).with_style(block_style.clone())]
        }
        "ul" | "ol" => {
            let kind = if el.name == "ol" {
                ListType::Number
            } else {
                ListType::Bullet
            };
            let items: Vec<NodeTree> = el
                .elements()
                .filter(|c| c.name == "li")
                .map(list_item_from_element)
                .collect();
            if items.is_empty() {
                return Vec::new();
            }
            vec![NodeTree::new(NodeKind::List(kind)).with_children(items)]
        }
        "li" => vec![NodeTree::new(NodeKind::List(ListType::Bullet))
            .with_children(vec![list_item_from_element(el)])],
        "table" => table_from_element(el).into_iter().collect(),
        "hr" => vec![NodeTree::new(NodeKind::Decorator(Decorator::HorizontalRule))],
        "img" => image_from_element(el)
            .map(|d| NodeTree::new(NodeKind::Decorator(d)))
            .into_iter()
            .collect(),
        "figure" => el
            .elements()
            .find(|c| c.name == "img")
            .and_then(image_from_element)
            .map(|d| NodeTree::new(NodeKind::Decorator(d)))
            .into_iter()
            .collect(),
        "video" => {
            let src = el
                .attribute("src")
                .map(str::to_string)
                .or_else(|| {
                    el.elements()
                        .find(|c| c.name == "source")
                        .and_then(|s| s.attribute("src").map(str::to_string))
                })
                .filter(|s| !s.is_empty());
            src.map(|src| {
                let mut video = VideoPayload::new(src);
                video.set_poster(el.attribute("poster").map(str::to_string));
                NodeTree::new(NodeKind::Decorator(Decorator::Video(video)))
            })
            .into_iter()
            .collect()
        }
        _ => {
            // Generic containers: nested blocks, or inline content as one
            // paragraph.
            if el.elements().any(is_block_element) {
                blocks_from_dom(&el.children)
            } else {
                let block = text_block(NodeKind::Paragraph);
                if block.children.is_empty() {
                    Vec::new()
                } else {
                    vec![block]
                }
            }
        }
    }
}

/// Inline runs of a text block. Block children are flattened into their
/// text, separated by newlines.
fn text_block_children(children: &[DomNode]) -> Vec<NodeTree> {
    let mut runs = Vec::new();
    for child in children {
        match child {
            DomNode::Element(el) if is_block_element(el) => {
                if !runs.is_empty() {
                    runs.push(NodeTree::text("\n", TextFormat::EMPTY));
                }
                runs.extend(inline_from_dom(&el.children, TextFormat::EMPTY, &Style::new()));
            }
            other => runs.extend(inline_from_dom(
                std::slice::from_ref(other),
                TextFormat::EMPTY,
                &Style::new(),
            )),
        }
    }
    let runs = trim_runs(runs);
    if runs.is_empty() {
        vec![NodeTree::text("", TextFormat::EMPTY)]
    } else {
        runs
    }
}

fn list_item_from_element(li: &DomElement) -> NodeTree {
    let mut inline: Vec<DomNode> = Vec::new();
    let mut nested = Vec::new();
    for child in &li.children {
        match child {
            DomNode::Element(el) if el.name == "ul" || el.name == "ol" => {
                nested.extend(block_from_element(el));
            }
            DomNode::Element(el) if el.name == "p" => {
                if !inline.is_empty() {
                    inline.push(DomNode::Text("\n".into()));
                }
                inline.extend(el.children.iter().cloned());
            }
            other => inline.push(other.clone()),
        }
    }
    let mut children = trim_runs(inline_from_dom(&inline, TextFormat::EMPTY, &Style::new()));
    if children.is_empty() {
        children.push(NodeTree::text("", TextFormat::EMPTY));
    }
    children.extend(nested);
    let style = li
        .attribute("style")
        .map(parse_style_attribute)
        .unwrap_or_default();
    NodeTree::new(NodeKind::ListItem)
        .with_style(style)
        .with_children(children)
}

fn table_from_element(table: &DomElement) -> Option<NodeTree> {
    let mut rows = Vec::new();
    let mut collect = |el: &DomElement| {
        for tr in el.elements().filter(|c| c.name == "tr") {
            let cells: Vec<NodeTree> = tr
                .elements()
                .filter(|c| c.name == "td" || c.name == "th")
                .map(|cell| {
                    let mut blocks = blocks_from_dom(&cell.children);
                    blocks.retain(|b| NodeKind::TableCell { header: false }.can_contain(&b.kind));
                    if blocks.is_empty() {
                        blocks.push(NodeTree::text_block(NodeKind::Paragraph, ""));
                    }
                    NodeTree::new(NodeKind::TableCell {
                        header: cell.name == "th",
                    })
                    .with_children(blocks)
                })
                .collect();
            if !cells.is_empty() {
                rows.push(NodeTree::new(NodeKind::TableRow).with_children(cells));
            }
        }
    };
    collect(table);
    for section in table
        .elements()
        .filter(|c| matches!(c.name.as_str(), "thead" | "tbody" | "tfoot"))
    {
        collect(section);
    }
    (!rows.is_empty()).then(|| NodeTree::new(NodeKind::Table).with_children(rows))
}

fn decorator_from_element(el: &DomElement) -> Option<Decorator> {
    let kind = el.attribute("data-node")?;
    let from_payload = el
        .attribute("data-payload")
        .and_then(|payload| serde_json::from_str::<Decorator>(payload).ok())
        .filter(|d| d.kind_name() == kind);
    if from_payload.is_some() {
        return from_payload;
    }
    tracing::debug!(kind, "decorator element without a usable payload");
    match kind {
        "horizontal_rule" => Some(Decorator::HorizontalRule),
        "image" | "thumbnail" => el
            .elements()
            .find(|c| c.name == "img")
            .or(Some(el).filter(|e| e.name == "img"))
            .and_then(image_from_element),
        _ => None,
    }
}

fn image_from_element(img: &DomElement) -> Option<Decorator> {
    let src = img.attribute("src").filter(|s| !s.is_empty())?;
    let mut payload = ImagePayload::new(src).alt(img.attribute("alt").unwrap_or_default());
    let dim = |name: &str| img.attribute(name).and_then(|v| v.trim().parse::<u32>().ok());
    payload.set_size(dim("width"), dim("height"));
    Some(Decorator::Image(payload))
}

fn inline_from_dom(nodes: &[DomNode], format: TextFormat, style: &Style) -> Vec<NodeTree> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            DomNode::Text(text) => {
                let text = collapse_whitespace(text);
                if !text.is_empty() {
                    out.push(NodeTree::text(text, format).with_style(style.clone()));
                }
            }
            DomNode::Element(el) => {
                let mark = match el.name.as_str() {
                    "strong" | "b" => Some(TextFormatType::Bold),
                    "em" | "i" => Some(TextFormatType::Italic),
                    "u" | "ins" => Some(TextFormatType::Underline),
                    "s" | "strike" | "del" => Some(TextFormatType::Strikethrough),
                    "code" | "kbd" => Some(TextFormatType::Code),
                    "sub" => Some(TextFormatType::Subscript),
                    "sup" => Some(TextFormatType::Superscript),
                    _ => None,
                };
                let mut inner_style = style.clone();
                if let Some(attr) = el.attribute("style") {
                    inner_style.extend(parse_style_attribute(attr));
                }
                match (el.name.as_str(), mark) {
                    (_, Some(mark)) => {
                        out.extend(inline_from_dom(&el.children, format.with(mark, true), &inner_style));
                    }
                    ("br", None) => out.push(NodeTree::text("\n", format)),
                    ("a", None) => {
                        let runs: Vec<NodeTree> = inline_from_dom(&el.children, format, &inner_style)
                            .into_iter()
                            .flat_map(flatten_to_text)
                            .collect();
                        match el.attribute("href").filter(|h| !h.is_empty()) {
                            Some(href) if !runs.is_empty() => out.push(
                                NodeTree::new(NodeKind::Link { url: href.to_string() }).with_children(runs),
                            ),
                            _ => out.extend(runs),
                        }
                    }
                    ("script" | "style" | "img" | "video", None) => {}
                    _ => out.extend(inline_from_dom(&el.children, format, &inner_style)),
                }
            }
        }
    }
    out
}

fn flatten_to_text(tree: NodeTree) -> Vec<NodeTree> {
    match tree.kind {
        NodeKind::Text(_) => vec![tree],
        _ => tree.children.into_iter().flat_map(flatten_to_text).collect(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Drops whitespace at the block edges and the runs left empty by it.
fn trim_runs(mut runs: Vec<NodeTree>) -> Vec<NodeTree> {
    if let Some(first) = runs.first_mut() {
        trim_edge(first, true);
    }
    if let Some(last) = runs.last_mut() {
        trim_edge(last, false);
    }
    runs.retain(|r| !r.text_content().is_empty());
    runs
}

fn trim_edge(tree: &mut NodeTree, start: bool) {
    match &mut tree.kind {
        NodeKind::Text(t) => {
            let trimmed = if start {
                t.text.trim_start_matches(' ')
            } else {
                t.text.trim_end_matches(' ')
            };
            t.text = trimmed.to_string();
        }
        _ => {
            let child = if start {
                tree.children.first_mut()
            } else {
                tree.children.last_mut()
            };
            if let Some(child) = child {
                trim_edge(child, start);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_attribute_keeps_known_properties() {
        let style = parse_style_attribute("color: red; display: none; font-size:20px");
        assert_eq!(style.get("color").map(String::as_str), Some("red"));
        assert_eq!(style.get("font-size").map(String::as_str), Some("20px"));
        assert!(!style.contains_key("display"));
    }

    #[test]
    fn sniffing_requires_a_leading_tag() {
        assert!(looks_like_html("  <p>hi</p>"));
        assert!(!looks_like_html("# <b>not html</b>"));
        assert!(!looks_like_html("a < b"));
    }

    #[test]
    fn loose_inline_content_becomes_a_paragraph() {
        let tree = html_to_tree("hello <b>world</b>").unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].kind, NodeKind::Paragraph);
        assert_eq!(tree.text_content(), "hello world");
    }
}
