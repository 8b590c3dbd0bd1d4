use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decorator::Decorator;
use crate::fragment::NodeTree;
use crate::node::{ListType, NodeKind, Style, TextData, TextFormat};
use crate::state::EditorState;

const DEFAULT_SCHEMA: &str = "manos-plate";
const DEFAULT_VERSION: u32 = 1;

/// Highest record version this build understands for any node type.
pub const NODE_VERSION: u32 = 1;

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    DEFAULT_VERSION
}

fn is_empty_style(style: &Style) -> bool {
    style.is_empty()
}

/// One node record. Kind-specific fields (`text`, `level`, `url`, decorator
/// payload fields ...) sit flat next to `type` and `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "is_empty_style")]
    pub style: Style,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedNode>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// The canonical persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub root: SerializedNode,
}

impl PlateValue {
    pub fn from_state(state: &EditorState) -> Self {
        let tree = NodeTree::from_state(state, state.root())
            .unwrap_or_else(|| NodeTree::new(NodeKind::Root));
        Self::from_tree(&tree)
    }

    pub fn from_tree(tree: &NodeTree) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            root: encode(tree),
        }
    }

    /// Decodes and validates. Anything that is not a well-formed document
    /// under this schema is an error, including well-formed JSON of another
    /// shape.
    pub fn into_tree(self) -> Result<NodeTree, String> {
        if self.schema != DEFAULT_SCHEMA {
            return Err(format!("unknown schema `{}`", self.schema));
        }
        if self.version > DEFAULT_VERSION {
            tracing::warn!(
                version = self.version,
                supported = DEFAULT_VERSION,
                "document version is newer than supported"
            );
        }
        if self.root.kind != "root" {
            return Err(format!("document root has type `{}`", self.root.kind));
        }
        let tree = decode(self.root)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

fn record(kind: &str, style: &Style) -> SerializedNode {
    SerializedNode {
        kind: kind.to_string(),
        version: NODE_VERSION,
        style: style.clone(),
        children: Vec::new(),
        fields: Map::new(),
    }
}

fn encode(tree: &NodeTree) -> SerializedNode {
    let mut out = record(tree.kind.name(), &tree.style);
    match &tree.kind {
        NodeKind::Text(t) => {
            out.fields.insert("text".into(), Value::String(t.text.clone()));
            if !t.format.is_empty() {
                out.fields.insert("format".into(), Value::from(t.format.bits()));
            }
        }
        NodeKind::Heading(level) => {
            out.fields.insert("level".into(), Value::from(*level));
        }
        NodeKind::List(kind) => {
            out.fields.insert("list_type".into(), Value::String(kind.as_str().into()));
        }
        NodeKind::Code { language: Some(lang) } => {
            out.fields.insert("language".into(), Value::String(lang.clone()));
        }
        NodeKind::Link { url } => {
            out.fields.insert("url".into(), Value::String(url.clone()));
        }
        NodeKind::TableCell { header: true } => {
            out.fields.insert("header".into(), Value::Bool(true));
        }
        NodeKind::Decorator(d) => {
            if let Ok(Value::Object(mut payload)) = serde_json::to_value(d) {
                payload.remove("type");
                out.fields = payload;
            }
        }
        _ => {}
    }
    out.children = tree.children.iter().map(encode).collect();
    out
}

fn decode(node: SerializedNode) -> Result<NodeTree, String> {
    if node.version > NODE_VERSION {
        tracing::warn!(
            node_type = %node.kind,
            version = node.version,
            supported = NODE_VERSION,
            "node record version is newer than supported"
        );
    }
    let fields = &node.fields;
    let str_field = |name: &str| fields.get(name).and_then(Value::as_str).map(str::to_string);
    let kind = match node.kind.as_str() {
        "root" => NodeKind::Root,
        "text" => {
            let text = str_field("text").ok_or("text record without `text`")?;
            let bits = fields.get("format").and_then(Value::as_u64).unwrap_or(0);
            let bits = u8::try_from(bits).map_err(|_| format!("text format {bits} out of range"))?;
            NodeKind::Text(TextData::new(text).with_format(TextFormat::from_bits(bits)))
        }
        "paragraph" => NodeKind::Paragraph,
        "heading" => {
            let level = fields
                .get("level")
                .and_then(Value::as_u64)
                .filter(|l| (1..=6).contains(l))
                .ok_or("heading record needs a `level` between 1 and 6")?;
            NodeKind::Heading(level as u8)
        }
        "list" => {
            let name = str_field("list_type").unwrap_or_else(|| "bullet".into());
            NodeKind::List(ListType::parse(&name).ok_or_else(|| format!("unknown list type `{name}`"))?)
        }
        "list_item" => NodeKind::ListItem,
        "quote" => NodeKind::Quote,
        "code" => NodeKind::Code {
            language: str_field("language"),
        },
        "link" => NodeKind::Link {
            url: str_field("url").ok_or("link record without `url`")?,
        },
        "table" => NodeKind::Table,
        "table_row" => NodeKind::TableRow,
        "table_cell" => NodeKind::TableCell {
            header: fields.get("header").and_then(Value::as_bool).unwrap_or(false),
        },
        other => {
            let mut payload = node.fields.clone();
            payload.insert("type".into(), Value::String(other.to_string()));
            let decorator: Decorator = serde_json::from_value(Value::Object(payload))
                .map_err(|err| format!("unknown or malformed `{other}` record: {err}"))?;
            NodeKind::Decorator(decorator)
        }
    };
    let children = node
        .children
        .into_iter()
        .map(decode)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(NodeTree {
        kind,
        style: node.style,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::Decorator;

    #[test]
    fn decorator_payload_is_flattened_into_the_record() {
        let tree = NodeTree::new(NodeKind::Root).with_children(vec![NodeTree::new(
            NodeKind::Decorator(Decorator::image("a.png")),
        )]);
        let value = serde_json::to_value(PlateValue::from_tree(&tree)).unwrap();
        let image = &value["root"]["children"][0];
        assert_eq!(image["type"], "image");
        assert_eq!(image["version"], 1);
        assert_eq!(image["src"], "a.png");
    }

    #[test]
    fn foreign_json_is_not_a_document() {
        assert!(PlateValue::from_json_str(r#"{"a":1}"#).is_err());
        let wrong_root = PlateValue::from_json_str(
            r#"{"root":{"type":"paragraph","version":1}}"#,
        )
        .unwrap();
        assert!(wrong_root.into_tree().is_err());
    }

    #[test]
    fn children_on_a_leaf_are_rejected() {
        let json = r#"{"schema":"manos-plate","version":1,"root":{"type":"root","children":[
            {"type":"paragraph","children":[
                {"type":"text","text":"a","children":[{"type":"text","text":"b"}]}
            ]}
        ]}}"#;
        let value = PlateValue::from_json_str(json).unwrap();
        assert!(value.into_tree().is_err());
    }
}
