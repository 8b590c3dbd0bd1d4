//! Markdown conversion. The block and inline rules below are shared by the
//! exporter and the importer, so anything the exporter writes for text,
//! headings, lists, quotes and code reads back to the same structure.
//! Decorators degrade to the closest Markdown construct.
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::decorator::{Decorator, ImagePayload};
use crate::fragment::NodeTree;
use crate::html::looks_like_html;
use crate::node::{ListType, NodeKind, TextFormat, TextFormatType};

const INDENT: &str = "    ";
const ESCAPABLE: &[char] = &['\\', '*', '_', '~', '`', '[', ']', '|', '<', '!'];
/// Escaped punctuation is parked in the private use area while inline rules
/// run, so an escaped marker can never open or close a span.
const PARKED_BASE: u32 = 0xE000;

struct Rules {
    heading: Regex,
    fence: Regex,
    rule: Regex,
    image: Regex,
    quote: Regex,
    list_item: Regex,
    table_separator: Regex,
    ordered_prefix: Regex,
    inline: Regex,
}

fn rules() -> Option<&'static Rules> {
    static RULES: OnceLock<Option<Rules>> = OnceLock::new();
    RULES
        .get_or_init(|| {
            let built = build_rules();
            if let Err(err) = &built {
                tracing::error!(error = %err, "markdown rules failed to compile");
            }
            built.ok()
        })
        .as_ref()
}

fn build_rules() -> Result<Rules, regex::Error> {
    Ok(Rules {
        heading: Regex::new(r"^(#{1,6})[ \t]+(.*?)[ \t]*$")?,
        fence: Regex::new(r"^```[ \t]*([A-Za-z0-9_+#.-]*)[ \t]*$")?,
        rule: Regex::new(r"^ {0,3}(?:-[ \t]*){3,}$|^ {0,3}(?:\*[ \t]*){3,}$|^ {0,3}(?:_[ \t]*){3,}$")?,
        image: Regex::new(r"^!\[([^\]]*)\]\(([^)\s]+)\)[ \t]*$")?,
        quote: Regex::new(r"^[ \t]{0,3}>[ \t]?(.*)$")?,
        list_item: Regex::new(r"^([ \t]*)([-*+]|\d+[.)])[ \t]+(.*)$")?,
        table_separator: Regex::new(r"^\|?[ \t]*:?-{3,}:?[ \t]*(?:\|[ \t]*:?-{3,}:?[ \t]*)*\|?[ \t]*$")?,
        ordered_prefix: Regex::new(r"^(\d+)([.)])")?,
        inline: Regex::new(concat!(
            r"\*\*(?P<bold>.+?)\*\*",
            r"|~~(?P<strike>.+?)~~",
            r"|`(?P<code>[^`]+)`",
            r"|\[(?P<label>[^\]]*)\]\((?P<url>[^)\s]*)\)",
            r"|_(?P<italic>[^_]+)_",
            r"|\*(?P<em>[^*]+)\*",
        ))?,
    })
}

// ---- export ----

pub fn tree_to_markdown(root: &NodeTree) -> String {
    let blocks: Vec<String> = root
        .children
        .iter()
        .filter_map(block_to_markdown)
        .collect();
    blocks.join("\n\n")
}

fn block_to_markdown(tree: &NodeTree) -> Option<String> {
    let text = match &tree.kind {
        NodeKind::Paragraph => escape_line_start(&inline_markdown(&tree.children)),
        NodeKind::Heading(level) => format!(
            "{} {}",
            "#".repeat(usize::from(*level)),
            inline_markdown(&tree.children)
        ),
        NodeKind::Quote => quote_lines(&inline_markdown(&tree.children)),
        NodeKind::Code { language } => format!(
            "```{}\n{}\n```",
            language.as_deref().unwrap_or(""),
            tree.text_content()
        ),
        NodeKind::List(_) => {
            let mut out = Vec::new();
            list_lines(tree, 0, &mut out);
            out.join("\n")
        }
        NodeKind::Table => table_markdown(tree)?,
        NodeKind::Decorator(decorator) => decorator_markdown(decorator)?,
        _ => return None,
    };
    Some(text)
}

fn quote_lines(text: &str) -> String {
    text.split('\n')
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn list_lines(list: &NodeTree, depth: usize, out: &mut Vec<String>) {
    let ordered = list.kind == NodeKind::List(ListType::Number);
    let indent = INDENT.repeat(depth);
    for (ix, item) in list.children.iter().enumerate() {
        let marker = if ordered {
            format!("{}.", ix + 1)
        } else {
            "-".to_string()
        };
        let (nested, inline): (Vec<&NodeTree>, Vec<&NodeTree>) = item
            .children
            .iter()
            .partition(|c| matches!(c.kind, NodeKind::List(_)));
        let inline: Vec<NodeTree> = inline.into_iter().cloned().collect();
        out.push(format!("{indent}{marker} {}", inline_markdown(&inline)));
        for sub in nested {
            list_lines(sub, depth + 1, out);
        }
    }
}

fn table_markdown(table: &NodeTree) -> Option<String> {
    let rows: Vec<Vec<String>> = table
        .children
        .iter()
        .map(|row| {
            row.children
                .iter()
                .map(|cell| {
                    cell.children
                        .iter()
                        .map(|block| inline_markdown(&block.children).replace('\n', " "))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect()
        })
        .collect();
    let width = rows.iter().map(Vec::len).max().filter(|w| *w > 0)?;
    let line = |cells: &[String]| {
        let mut padded: Vec<&str> = cells.iter().map(String::as_str).collect();
        padded.resize(width, "");
        format!("| {} |", padded.join(" | "))
    };
    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(line(&rows[0]));
    out.push(format!("|{}", " --- |".repeat(width)));
    for row in &rows[1..] {
        out.push(line(row));
    }
    Some(out.join("\n"))
}

fn decorator_markdown(decorator: &Decorator) -> Option<String> {
    match decorator {
        Decorator::Image(img) => Some(format!("![{}]({})", escape(&img.alt), img.src)),
        Decorator::Thumbnail(thumb) => Some(format!("![{}]({})", escape(&thumb.alt), thumb.src)),
        Decorator::Video(video) => Some(format!("[{}]({})", escape(&video.src), video.src)),
        Decorator::Card(card) => {
            let title = format!("**{}**", escape(&card.title));
            if card.body.is_empty() {
                Some(title)
            } else {
                Some(format!("{title}\n\n{}", escape_line_start(&escape(&card.body))))
            }
        }
        Decorator::Callout(callout) => Some(quote_lines(&escape(&callout.body))),
        Decorator::HorizontalRule => Some("---".to_string()),
    }
}

fn inline_markdown(children: &[NodeTree]) -> String {
    let mut out = String::new();
    for child in children {
        match &child.kind {
            NodeKind::Text(t) => out.push_str(&format_run(&t.text, t.format)),
            NodeKind::Link { url } => {
                out.push('[');
                out.push_str(&inline_markdown(&child.children));
                out.push_str("](");
                out.push_str(url);
                out.push(')');
            }
            _ => {}
        }
    }
    out
}

fn format_run(text: &str, format: TextFormat) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut s = if format.has(TextFormatType::Code) {
        format!("`{text}`")
    } else {
        escape(text)
    };
    if format.has(TextFormatType::Strikethrough) {
        s = format!("~~{s}~~");
    }
    if format.has(TextFormatType::Italic) {
        s = format!("_{s}_");
    }
    if format.has(TextFormatType::Bold) {
        s = format!("**{s}**");
    }
    s
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ESCAPABLE.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Keeps paragraph text from reading back as a heading, quote or list item.
fn escape_line_start(line: &str) -> String {
    let starts_block = line.starts_with('#')
        || line.starts_with('>')
        || line.starts_with("- ")
        || line.starts_with("+ ")
        || line.starts_with("---");
    if starts_block {
        return format!("\\{line}");
    }
    if let Some(caps) = rules().and_then(|r| r.ordered_prefix.captures(line)) {
        if let (Some(num), Some(mark)) = (caps.get(1), caps.get(2)) {
            return format!("{}\\{}", num.as_str(), &line[mark.start()..]);
        }
    }
    line.to_string()
}

// ---- import ----

#[derive(Debug)]
struct ListLine {
    depth: usize,
    kind: ListType,
    text: String,
}

/// Parses `input` as Markdown. Declines empty input and input that reads
/// as HTML markup.
pub fn markdown_to_tree(input: &str) -> Result<NodeTree, String> {
    if input.trim().is_empty() {
        return Err("empty input".into());
    }
    if looks_like_html(input) {
        return Err("input looks like HTML markup".into());
    }
    let rules = rules().ok_or("markdown rules unavailable")?;
    let lines: Vec<&str> = input.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }
        if let Some(caps) = rules.fence.captures(line) {
            let language = caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .filter(|l| !l.is_empty());
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && lines[i].trim_end() != "```" {
                body.push(lines[i]);
                i += 1;
            }
            i += 1;
            blocks.push(NodeTree::text_block(NodeKind::Code { language }, body.join("\n")));
            continue;
        }
        if rules.rule.is_match(line) {
            blocks.push(NodeTree::new(NodeKind::Decorator(Decorator::HorizontalRule)));
            i += 1;
            continue;
        }
        if let Some(caps) = rules.heading.captures(line) {
            let level = caps.get(1).map_or(1, |m| m.as_str().len()) as u8;
            let text = caps.get(2).map_or("", |m| m.as_str());
            blocks.push(text_block(NodeKind::heading(level), rules, text));
            i += 1;
            continue;
        }
        if let Some(caps) = rules.image.captures(line) {
            let alt = caps.get(1).map_or("", |m| m.as_str());
            let src = caps.get(2).map_or("", |m| m.as_str());
            let image = ImagePayload::new(src).alt(unescape(alt));
            blocks.push(NodeTree::new(NodeKind::Decorator(Decorator::Image(image))));
            i += 1;
            continue;
        }
        if rules.quote.is_match(line) {
            let mut quoted = Vec::new();
            while let Some(caps) = lines.get(i).and_then(|l| rules.quote.captures(l)) {
                quoted.push(caps.get(1).map_or("", |m| m.as_str()));
                i += 1;
            }
            blocks.push(text_block(NodeKind::Quote, rules, &quoted.join("\n")));
            continue;
        }
        if rules.list_item.is_match(line) {
            let mut items = Vec::new();
            let mut indents: Vec<usize> = Vec::new();
            while let Some(caps) = lines.get(i).and_then(|l| rules.list_item.captures(l)) {
                let indent = caps.get(1).map_or(0, |m| indent_width(m.as_str()));
                while indents.last().is_some_and(|last| *last > indent) {
                    indents.pop();
                }
                if indents.last().is_none_or(|last| *last < indent) {
                    indents.push(indent);
                }
                let marker = caps.get(2).map_or("-", |m| m.as_str());
                let kind = if marker.starts_with(|c: char| c.is_ascii_digit()) {
                    ListType::Number
                } else {
                    ListType::Bullet
                };
                items.push(ListLine {
                    depth: indents.len().saturating_sub(1),
                    kind,
                    text: caps.get(3).map_or("", |m| m.as_str()).to_string(),
                });
                i += 1;
            }
            let mut pos = 0;
            while pos < items.len() {
                let depth = items[pos].depth;
                blocks.push(build_list(&items, &mut pos, depth, rules));
            }
            continue;
        }
        if line.trim_start().starts_with('|')
            && lines.get(i + 1).is_some_and(|next| rules.table_separator.is_match(next))
        {
            let mut rows = vec![table_row(line, true, rules)];
            i += 2;
            while let Some(row) = lines.get(i).filter(|l| l.trim_start().starts_with('|')) {
                rows.push(table_row(row, false, rules));
                i += 1;
            }
            blocks.push(NodeTree::new(NodeKind::Table).with_children(rows));
            continue;
        }

        let mut para = Vec::new();
        while let Some(l) = lines.get(i) {
            if l.trim().is_empty() || (!para.is_empty() && starts_other_block(l, rules)) {
                break;
            }
            para.push(l.trim());
            i += 1;
        }
        blocks.push(text_block(NodeKind::Paragraph, rules, &para.join(" ")));
    }
    if blocks.is_empty() {
        return Err("no blocks".into());
    }
    let tree = NodeTree::new(NodeKind::Root).with_children(blocks);
    tree.validate()?;
    Ok(tree)
}

fn starts_other_block(line: &str, rules: &Rules) -> bool {
    rules.fence.is_match(line)
        || rules.heading.is_match(line)
        || rules.quote.is_match(line)
        || rules.list_item.is_match(line)
        || rules.rule.is_match(line)
}

fn indent_width(prefix: &str) -> usize {
    prefix.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum()
}

fn build_list(items: &[ListLine], pos: &mut usize, depth: usize, rules: &Rules) -> NodeTree {
    let kind = items[*pos].kind;
    let mut children: Vec<NodeTree> = Vec::new();
    while let Some(item) = items.get(*pos) {
        if item.depth < depth {
            break;
        }
        if item.depth > depth {
            let nested = build_list(items, pos, item.depth, rules);
            match children.last_mut() {
                Some(last) => last.children.push(nested),
                None => children.push(
                    NodeTree::new(NodeKind::ListItem)
                        .with_children(vec![NodeTree::text("", TextFormat::EMPTY), nested]),
                ),
            }
            continue;
        }
        if item.kind != kind {
            break;
        }
        children.push(text_block(NodeKind::ListItem, rules, &item.text));
        *pos += 1;
    }
    NodeTree::new(NodeKind::List(kind)).with_children(children)
}

fn table_row(line: &str, header: bool, rules: &Rules) -> NodeTree {
    let cells = split_cells(line)
        .into_iter()
        .map(|cell| {
            NodeTree::new(NodeKind::TableCell { header })
                .with_children(vec![text_block(NodeKind::Paragraph, rules, cell.trim())])
        })
        .collect();
    NodeTree::new(NodeKind::TableRow).with_children(cells)
}

/// Splits a pipe-table row on unescaped `|`.
fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = match trimmed.strip_suffix('|') {
        Some(rest) if !rest.ends_with('\\') => rest,
        _ => trimmed,
    };
    let mut cells = vec![String::new()];
    let mut chars = trimmed.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(cell) = cells.last_mut() {
                    cell.push('\\');
                    if let Some(next) = chars.next() {
                        cell.push(next);
                    }
                }
            }
            '|' => cells.push(String::new()),
            _ => {
                if let Some(cell) = cells.last_mut() {
                    cell.push(ch);
                }
            }
        }
    }
    cells
}

fn text_block(kind: NodeKind, rules: &Rules, text: &str) -> NodeTree {
    let mut runs = parse_inline(&park_escapes(text), TextFormat::EMPTY, rules);
    if runs.is_empty() {
        runs.push(NodeTree::text("", TextFormat::EMPTY));
    }
    NodeTree::new(kind).with_children(runs)
}

fn park_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.peek().copied().filter(char::is_ascii_punctuation) {
                chars.next();
                if let Some(parked) = char::from_u32(PARKED_BASE + next as u32) {
                    out.push(parked);
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Brings parked characters back. Inside code spans the backslash is kept,
/// since code text is written unescaped.
fn unpark(text: &str, keep_backslash: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let code = ch as u32;
        match code
            .checked_sub(PARKED_BASE)
            .filter(|c| *c < 0x80)
            .and_then(char::from_u32)
        {
            Some(original) => {
                if keep_backslash {
                    out.push('\\');
                }
                out.push(original);
            }
            None => out.push(ch),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    unpark(&park_escapes(text), false)
}

fn parse_inline(text: &str, format: TextFormat, rules: &Rules) -> Vec<NodeTree> {
    let mut out = Vec::new();
    let mut last = 0;
    let push_text = |out: &mut Vec<NodeTree>, s: &str| {
        if !s.is_empty() {
            out.push(NodeTree::text(unpark(s, false), format));
        }
    };
    for caps in rules.inline.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_text(&mut out, &text[last..whole.start()]);
        out.extend(inline_span(&caps, format, rules));
        last = whole.end();
    }
    push_text(&mut out, &text[last..]);
    out
}

fn inline_span(caps: &Captures<'_>, format: TextFormat, rules: &Rules) -> Vec<NodeTree> {
    let marked = |name: &str, mark: TextFormatType| {
        caps.name(name)
            .map(|m| parse_inline(m.as_str(), format.with(mark, true), rules))
    };
    if let Some(runs) = marked("bold", TextFormatType::Bold) {
        return runs;
    }
    if let Some(runs) = marked("strike", TextFormatType::Strikethrough) {
        return runs;
    }
    if let Some(code) = caps.name("code") {
        let format = format.with(TextFormatType::Code, true);
        return vec![NodeTree::text(unpark(code.as_str(), true), format)];
    }
    if let Some(url) = caps.name("url") {
        let url = unpark(url.as_str(), false);
        let label = caps.name("label").map_or("", |m| m.as_str());
        let mut runs: Vec<NodeTree> = parse_inline(label, format, rules)
            .into_iter()
            .filter(|r| matches!(r.kind, NodeKind::Text(_)))
            .collect();
        if runs.is_empty() {
            runs.push(NodeTree::text(url.clone(), format));
        }
        return vec![NodeTree::new(NodeKind::Link { url }).with_children(runs)];
    }
    if let Some(runs) = marked("italic", TextFormatType::Italic) {
        return runs;
    }
    marked("em", TextFormatType::Italic).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> NodeTree {
        markdown_to_tree(input).unwrap()
    }

    #[test]
    fn escaped_markers_stay_literal() {
        let tree = parse(r"2 \* 3 \_not italic\_");
        let para = &tree.children[0];
        assert_eq!(para.children.len(), 1);
        assert_eq!(tree.text_content(), "2 * 3 _not italic_");
    }

    #[test]
    fn nested_marks_accumulate() {
        let tree = parse("**bold _both_**");
        let runs = &tree.children[0].children;
        assert_eq!(runs.len(), 2);
        let NodeKind::Text(both) = &runs[1].kind else {
            panic!("expected text");
        };
        assert!(both.format.has(TextFormatType::Bold));
        assert!(both.format.has(TextFormatType::Italic));
    }

    #[test]
    fn four_space_indent_nests_lists() {
        let tree = parse("- a\n    - b\n- c");
        assert_eq!(tree.children.len(), 1);
        let list = &tree.children[0];
        assert_eq!(list.children.len(), 2);
        let first = &list.children[0];
        assert!(matches!(first.children[1].kind, NodeKind::List(ListType::Bullet)));
    }

    #[test]
    fn paragraph_that_looks_like_a_heading_is_escaped() {
        let root = NodeTree::new(NodeKind::Root)
            .with_children(vec![NodeTree::text_block(NodeKind::Paragraph, "# not a heading")]);
        let md = tree_to_markdown(&root);
        assert_eq!(md, r"\# not a heading");
        assert_eq!(parse(&md).children[0].kind, NodeKind::Paragraph);
    }

    #[test]
    fn html_input_is_declined() {
        assert!(markdown_to_tree("<p>hi</p>").is_err());
        assert!(markdown_to_tree("   ").is_err());
    }

    #[test]
    fn pipe_tables_parse_with_a_header_row() {
        let tree = parse("| a | b |\n| --- | --- |\n| 1 | 2 \\| 3 |");
        let table = &tree.children[0];
        assert_eq!(table.kind, NodeKind::Table);
        assert_eq!(table.children.len(), 2);
        assert_eq!(table.children[0].children[0].kind, NodeKind::TableCell { header: true });
        assert_eq!(table.children[1].children[1].text_content(), "2 | 3");
    }
}
