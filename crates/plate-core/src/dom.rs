//! Minimal DOM-like element tree shared by the HTML exporter, the HTML
//! importer and the surface renderer.
//!
//! The tokenizer is deliberately small: ASCII tag and attribute names
//! (`[A-Za-z0-9:_-]`), quoted or bare attribute values, comments and
//! doctypes skipped, `script`/`style` bodies dropped. It is not an HTML5
//! parser; unmatched end tags are ignored and unclosed elements are closed
//! at the end of input.
use memchr::memchr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Element(DomElement),
    Text(String),
}

impl DomNode {
    pub fn as_element(&self) -> Option<&DomElement> {
        match self {
            DomNode::Element(el) => Some(el),
            DomNode::Text(_) => None,
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            DomNode::Element(el) => el.text_content(),
            DomNode::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<DomNode>,
}

impl DomElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Sets an attribute, replacing an existing one of the same name.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(mut self, node: DomNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(DomNode::Text(text.into()))
    }

    pub fn push(&mut self, node: DomNode) {
        self.children.push(node);
    }

    pub fn elements(&self) -> impl Iterator<Item = &DomElement> {
        self.children.iter().filter_map(DomNode::as_element)
    }

    pub fn text_content(&self) -> String {
        self.children.iter().map(DomNode::text_content).collect()
    }

    pub fn into_node(self) -> DomNode {
        DomNode::Element(self)
    }
}

pub fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "param" | "source" | "track" | "wbr"
    )
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attribute(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn serialize(nodes: &[DomNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &DomNode) {
    match node {
        DomNode::Text(text) => out.push_str(&escape_text(text)),
        DomNode::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (name, value) in &el.attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attribute(value));
                out.push('"');
            }
            out.push('>');
            if is_void_element(&el.name) {
                return;
            }
            for child in &el.children {
                write_node(out, child);
            }
            out.push_str("</");
            out.push_str(&el.name);
            out.push('>');
        }
    }
}

/// Decodes the named entities the exporter produces plus `&nbsp;` and
/// semicolon-terminated numeric references. Anything else passes through.
pub fn decode_entities(s: &str) -> String {
    let bytes = s.as_bytes();
    let Some(first) = memchr(b'&', bytes) else {
        return s.to_string();
    };
    let mut out = String::with_capacity(s.len());
    out.push_str(&s[..first]);
    let mut i = first;
    while i < bytes.len() {
        if bytes[i] != b'&' {
            let next = memchr(b'&', &bytes[i..]).map_or(bytes.len(), |rel| i + rel);
            out.push_str(&s[i..next]);
            i = next;
            continue;
        }
        let rest = &s[i..];
        let window = &bytes[i..bytes.len().min(i + 12)];
        let Some(semi) = memchr(b';', window) else {
            out.push('&');
            i += 1;
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                i += semi + 1;
            }
            None => {
                out.push('&');
                i += 1;
            }
        }
    }
    out
}

#[derive(Debug)]
enum Token {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
        self_closing: bool,
    },
    End(String),
    Text(String),
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_' || c == b':'
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut i = 0;
    // Slices are only cut at ASCII structural bytes, so every endpoint is a
    // char boundary.
    while i < len {
        if bytes[i] != b'<' {
            let end = memchr(b'<', &bytes[i..]).map_or(len, |rel| i + rel);
            out.push(Token::Text(decode_entities(&input[i..end])));
            i = end;
            continue;
        }
        if input[i..].starts_with("<!--") {
            i = input[i + 4..].find("-->").map_or(len, |end| i + 4 + end + 3);
            continue;
        }
        if bytes.get(i + 1).is_some_and(|b| *b == b'!' || *b == b'?') {
            i = memchr(b'>', &bytes[i..]).map_or(len, |rel| i + rel + 1);
            continue;
        }
        if bytes.get(i + 1) == Some(&b'/') {
            let start = i + 2;
            let mut j = start;
            while j < len && is_name_char(bytes[j]) {
                j += 1;
            }
            let name = input[start..j].to_ascii_lowercase();
            i = memchr(b'>', &bytes[j..]).map_or(len, |rel| j + rel + 1);
            if !name.is_empty() {
                out.push(Token::End(name));
            }
            continue;
        }

        let start = i + 1;
        let mut k = start;
        while k < len && is_name_char(bytes[k]) {
            k += 1;
        }
        if k == start {
            // A lone `<` is text.
            out.push(Token::Text("<".into()));
            i += 1;
            continue;
        }
        let name = input[start..k].to_ascii_lowercase();
        let mut attributes = Vec::new();
        let mut self_closing = false;
        loop {
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k >= len {
                break;
            }
            if bytes[k] == b'>' {
                k += 1;
                break;
            }
            if bytes[k] == b'/' {
                if bytes.get(k + 1) == Some(&b'>') {
                    self_closing = true;
                    k += 2;
                    break;
                }
                k += 1;
                continue;
            }
            let name_start = k;
            while k < len && is_name_char(bytes[k]) {
                k += 1;
            }
            if name_start == k {
                k += 1;
                continue;
            }
            let attr_name = input[name_start..k].to_ascii_lowercase();
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            let mut value = String::new();
            if k < len && bytes[k] == b'=' {
                k += 1;
                while k < len && bytes[k].is_ascii_whitespace() {
                    k += 1;
                }
                if k < len && (bytes[k] == b'"' || bytes[k] == b'\'') {
                    let quote = bytes[k];
                    let vstart = k + 1;
                    let vend = memchr(quote, &bytes[vstart..]).map_or(len, |rel| vstart + rel);
                    value = decode_entities(&input[vstart..vend]);
                    k = (vend + 1).min(len);
                } else {
                    let vstart = k;
                    while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
                        k += 1;
                    }
                    value = decode_entities(&input[vstart..k]);
                }
            }
            attributes.push((attr_name, value));
        }
        i = k;

        if name == "script" || name == "style" {
            if !self_closing {
                let close = format!("</{name}");
                let lower = input[i..].to_ascii_lowercase();
                i = match lower.find(&close) {
                    Some(rel) => memchr(b'>', &bytes[i + rel..]).map_or(len, |end| i + rel + end + 1),
                    None => len,
                };
            }
            continue;
        }
        let self_closing = self_closing || is_void_element(&name);
        out.push(Token::Start {
            name,
            attributes,
            self_closing,
        });
    }
    out
}

/// Parses an HTML fragment into top-level nodes.
pub fn parse_fragment(input: &str) -> Vec<DomNode> {
    let mut stack: Vec<DomElement> = vec![DomElement::new("#fragment")];
    for token in tokenize(input) {
        match token {
            Token::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    parent.push(DomNode::Text(text));
                }
            }
            Token::Start {
                name,
                attributes,
                self_closing,
            } => {
                let el = DomElement {
                    name,
                    attributes,
                    children: Vec::new(),
                };
                if self_closing {
                    if let Some(parent) = stack.last_mut() {
                        parent.push(el.into_node());
                    }
                } else {
                    stack.push(el);
                }
            }
            Token::End(name) => {
                let Some(depth) = stack.iter().rposition(|el| el.name == name) else {
                    continue;
                };
                if depth == 0 {
                    continue;
                }
                while stack.len() > depth {
                    close_top(&mut stack);
                }
            }
        }
    }
    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().map(|fragment| fragment.children).unwrap_or_default()
}

fn close_top(stack: &mut Vec<DomElement>) {
    if let Some(el) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.push(el.into_node());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let nodes = parse_fragment(r#"<p class="x">a <b>bold</b> &amp; c</p><img src='a.png'>"#);
        assert_eq!(nodes.len(), 2);
        let p = nodes[0].as_element().unwrap();
        assert_eq!(p.name, "p");
        assert_eq!(p.attribute("class"), Some("x"));
        assert_eq!(p.text_content(), "a bold & c");
        let img = nodes[1].as_element().unwrap();
        assert_eq!(img.attribute("src"), Some("a.png"));
        assert!(img.children.is_empty());
    }

    #[test]
    fn serializer_escapes_text_and_attributes() {
        let el = DomElement::new("a").attr("href", "x?a=1&b=\"2\"").text("<tag>");
        assert_eq!(
            serialize(&[el.into_node()]),
            r#"<a href="x?a=1&amp;b=&quot;2&quot;">&lt;tag&gt;</a>"#
        );
    }

    #[test]
    fn scripts_and_comments_are_dropped() {
        let nodes = parse_fragment("<!-- hi --><script>if (a < b) {}</script><p>ok</p>");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text_content(), "ok");
    }

    #[test]
    fn numeric_entities_decode() {
        assert_eq!(decode_entities("&#65;&#x42;&unknown;"), "AB&unknown;");
    }
}
