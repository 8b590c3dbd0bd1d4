use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::commands::{block, decorator, format, link, list, table, text};
use crate::core::{Editor, EditorConfig, EditorError};
use crate::decorator::Decorator;
use crate::node::{NodeKey, TextFormatType};
use crate::normalize;
use crate::tracker::{Alignment, BlockType};
use crate::transaction::Transaction;

#[derive(Debug, Clone)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<EditorError> for CommandError {
    fn from(err: EditorError) -> Self {
        CommandError::new(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for QueryError {}

pub type CommandHandler =
    Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<bool, CommandError> + Send + Sync>;

pub type QueryHandler = Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>;

/// A named mutation. Handlers return `Ok(false)` when the current selection
/// does not support the command, and `Err` only for malformed arguments or a
/// failed transaction.
#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub hidden: bool,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<bool, CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            hidden: false,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

/// A structural repair run before every commit. Returns whether it changed
/// anything; passes are re-run until none does.
pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, tx: &mut Transaction, config: &EditorConfig) -> bool;
}

pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<&'static str>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    fn builtin(plugins: Vec<Box<dyn EditorPlugin>>) -> Self {
        let mut registry = Self::default();
        for plugin in plugins {
            let id = plugin.id();
            if let Err(err) = registry.register_plugin(plugin) {
                tracing::error!(plugin = id, error = %err, "builtin plugin rejected");
            }
        }
        registry
    }

    /// Normalization, text editing, history and queries.
    pub fn core() -> Self {
        Self::builtin(vec![
            Box::new(CoreNormalizePlugin),
            Box::new(TextEditingPlugin),
            Box::new(HistoryPlugin),
            Box::new(CoreQueriesPlugin),
        ])
    }

    pub fn richtext() -> Self {
        Self::builtin(vec![
            Box::new(CoreNormalizePlugin),
            Box::new(TextEditingPlugin),
            Box::new(HistoryPlugin),
            Box::new(CoreQueriesPlugin),
            Box::new(MarksPlugin),
            Box::new(BlockFormatPlugin),
            Box::new(ListPlugin),
            Box::new(LinkPlugin),
            Box::new(TablePlugin),
            Box::new(DecoratorPlugin),
        ])
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), String> {
        if self.plugins.contains(&plugin.id()) {
            return Err(format!("Duplicate plugin id: {}", plugin.id()));
        }

        let commands = plugin.commands();
        for cmd in &commands {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
        }
        let queries = plugin.queries();
        for query in &queries {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
        }

        self.plugins.push(plugin.id());
        self.normalize_passes.extend(plugin.normalize_passes());
        for cmd in commands {
            self.commands.insert(cmd.id.clone(), cmd);
        }
        for query in queries {
            self.queries.insert(query.id.clone(), query);
        }
        Ok(())
    }

    pub fn plugin_ids(&self) -> &[&'static str] {
        &self.plugins
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }
}

fn arg<'a>(args: &'a Option<Value>, name: &str) -> Option<&'a Value> {
    args.as_ref().and_then(|v| v.get(name))
}

fn arg_str<'a>(args: &'a Option<Value>, name: &str) -> Option<&'a str> {
    arg(args, name).and_then(Value::as_str)
}

fn required_str<'a>(args: &'a Option<Value>, name: &str) -> Result<&'a str, CommandError> {
    arg_str(args, name).ok_or_else(|| CommandError::new(format!("Missing args.{name}")))
}

fn required_key(args: &Option<Value>) -> Result<NodeKey, CommandError> {
    arg(args, "key")
        .cloned()
        .and_then(|v| serde_json::from_value::<NodeKey>(v).ok())
        .ok_or_else(|| CommandError::new("Missing or invalid args.key"))
}

fn parse_format(name: &str) -> Result<TextFormatType, CommandError> {
    TextFormatType::parse(name).ok_or_else(|| CommandError::new(format!("Unknown text format: {name}")))
}

struct CoreNormalizePlugin;

impl EditorPlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        normalize::core_passes()
    }
}

struct TextEditingPlugin;

impl EditorPlugin for TextEditingPlugin {
    fn id(&self) -> &'static str {
        "core.text"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("text.insert", "Insert text", |editor, args| {
                let value = required_str(&args, "text")?.to_string();
                Ok(text::insert_text(editor, &value)?)
            })
            .description("Replace the selection with text, adopting the pending caret format.")
            .keywords(["type", "insert", "text"])
            .args_example(serde_json::json!({ "text": "hello" }))
            .hidden(true),
            CommandSpec::new("text.delete_backward", "Delete backward", |editor, _args| {
                Ok(text::delete_backward(editor)?)
            })
            .description("Delete the selection or the character before the caret.")
            .keywords(["backspace", "delete"])
            .hidden(true),
            CommandSpec::new("text.delete_forward", "Delete forward", |editor, _args| {
                Ok(text::delete_forward(editor)?)
            })
            .description("Delete the selection or the character after the caret.")
            .keywords(["delete"])
            .hidden(true),
            CommandSpec::new("text.insert_paragraph", "Insert paragraph", |editor, _args| {
                Ok(text::insert_paragraph(editor)?)
            })
            .description("Split the current block at the caret.")
            .keywords(["enter", "newline", "split"])
            .hidden(true),
            CommandSpec::new("text.paste", "Paste text", |editor, args| {
                let value = required_str(&args, "text")?.to_string();
                Ok(text::paste_text(editor, &value)?)
            })
            .description("Insert multi-line text as a single edit, one paragraph per line.")
            .keywords(["paste", "clipboard"])
            .args_example(serde_json::json!({ "text": "one\ntwo" }))
            .hidden(true),
            CommandSpec::new("selection.select_all", "Select all", |editor, _args| {
                Ok(text::select_all(editor)?)
            })
            .description("Select from the first to the last text position.")
            .keywords(["select", "all"]),
        ]
    }
}

struct HistoryPlugin;

impl EditorPlugin for HistoryPlugin {
    fn id(&self) -> &'static str {
        "core.history"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("history.undo", "Undo", |editor, _args| Ok(editor.undo()))
                .description("Restore the snapshot before the last change.")
                .keywords(["undo", "history"]),
            CommandSpec::new("history.redo", "Redo", |editor, _args| Ok(editor.redo()))
                .description("Re-apply the last undone change.")
                .keywords(["redo", "history"]),
        ]
    }
}

struct CoreQueriesPlugin;

impl EditorPlugin for CoreQueriesPlugin {
    fn id(&self) -> &'static str {
        "core.queries"
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("selection.attributes", |editor, _args| {
                serde_json::to_value(editor.selection_attributes())
                    .map_err(|err| QueryError::new(format!("Failed to encode attributes: {err}")))
            }),
            QuerySpec::new("document.text", |editor, _args| {
                Ok(Value::String(
                    editor.read(|state| state.text_content(state.root())),
                ))
            }),
            QuerySpec::new("format.is_active", |editor, args| {
                let name = arg_str(&args, "format")
                    .ok_or_else(|| QueryError::new("Missing args.format"))?;
                let format = TextFormatType::parse(name)
                    .ok_or_else(|| QueryError::new(format!("Unknown text format: {name}")))?;
                Ok(Value::Bool(editor.selection_attributes().formats.has(format)))
            }),
        ]
    }
}

struct MarksPlugin;

impl EditorPlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "format.marks"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let mut commands: Vec<CommandSpec> = TextFormatType::ALL
            .into_iter()
            .map(|format_type| {
                let name = format_type.as_str();
                CommandSpec::new(
                    format!("format.{name}"),
                    format!("Toggle {name}"),
                    move |editor, _args| Ok(format::toggle_format(editor, format_type)?),
                )
                .description(format!("Toggle {name} on the current selection or caret."))
                .keywords([name, "format", "mark"])
            })
            .collect();
        commands.push(
            CommandSpec::new("format.text", "Toggle text format", |editor, args| {
                let format_type = parse_format(required_str(&args, "format")?)?;
                Ok(format::toggle_format(editor, format_type)?)
            })
            .description("Toggle the named text format.")
            .keywords(["format", "mark"])
            .args_example(serde_json::json!({ "format": "bold" })),
        );
        commands
    }
}

struct BlockFormatPlugin;

impl EditorPlugin for BlockFormatPlugin {
    fn id(&self) -> &'static str {
        "format.block"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("format.block", "Set block type", |editor, args| {
                let name = required_str(&args, "block")?;
                let target = BlockType::parse(name)
                    .filter(|b| *b != BlockType::TableCell)
                    .ok_or_else(|| CommandError::new(format!("Unknown block type: {name}")))?;
                Ok(block::set_block_type(editor, target)?)
            })
            .description("Change the block type of every block in the selection.")
            .keywords(["heading", "paragraph", "quote", "code", "block"])
            .args_example(serde_json::json!({ "block": "h1" })),
            CommandSpec::new("align.set", "Align", |editor, args| {
                let name = required_str(&args, "align")?;
                let align = Alignment::parse(name)
                    .ok_or_else(|| CommandError::new(format!("Unknown alignment: {name}")))?;
                Ok(block::set_alignment(editor, align)?)
            })
            .description("Set text alignment on the selected blocks.")
            .keywords(["align", "left", "center", "right", "justify"])
            .args_example(serde_json::json!({ "align": "center" })),
            CommandSpec::new("indent.increase", "Indent", |editor, _args| {
                Ok(block::indent(editor, block::IndentDirection::Increase)?)
            })
            .description("Indent blocks, or nest list items one level deeper.")
            .keywords(["indent", "tab"]),
            CommandSpec::new("indent.decrease", "Outdent", |editor, _args| {
                Ok(block::indent(editor, block::IndentDirection::Decrease)?)
            })
            .description("Outdent blocks, or lift nested list items one level.")
            .keywords(["outdent", "dedent", "indent"]),
            CommandSpec::new("style.set", "Set style", |editor, args| {
                let property = required_str(&args, "property")?;
                let property = block::StyleProperty::parse(property)
                    .ok_or_else(|| CommandError::new(format!("Unsupported style property: {property}")))?;
                let value = match arg(&args, "value") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    Some(other) => {
                        return Err(CommandError::new(format!("Invalid style value: {other}")));
                    }
                };
                Ok(block::set_style(editor, property, value)?)
            })
            .description("Patch an inline style property on the selected text.")
            .keywords(["font", "size", "color", "background", "style"])
            .args_example(serde_json::json!({ "property": "font-size", "value": "20px" })),
        ]
    }
}

struct ListPlugin;

impl EditorPlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.toggle", "Toggle list", |editor, args| {
                let name = required_str(&args, "kind")?;
                let kind = crate::node::ListType::parse(name)
                    .ok_or_else(|| CommandError::new(format!("Unknown list kind: {name}")))?;
                Ok(list::toggle_list(editor, kind)?)
            })
            .description("Wrap the selected blocks in a list, or unwrap them when already that list.")
            .keywords(["list", "bullet", "number", "ordered", "unordered"])
            .args_example(serde_json::json!({ "kind": "bullet" })),
        ]
    }
}

struct LinkPlugin;

impl EditorPlugin for LinkPlugin {
    fn id(&self) -> &'static str {
        "link"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("link.insert", "Insert link", |editor, args| {
                let url = required_str(&args, "url")?.trim().to_string();
                if url.is_empty() {
                    return Err(CommandError::new("args.url must not be empty"));
                }
                let label = arg_str(&args, "label")
                    .filter(|l| !l.is_empty())
                    .map(str::to_string);
                Ok(link::insert_link(editor, &url, label.as_deref())?)
            })
            .description("Link the selected text, or insert a new linked text run.")
            .keywords(["link", "url", "href"])
            .args_example(serde_json::json!({ "url": "https://example.com", "label": "Example" })),
            CommandSpec::new("link.remove", "Remove link", |editor, _args| {
                Ok(link::remove_link(editor)?)
            })
            .description("Unwrap the link around the caret.")
            .keywords(["link", "unlink"]),
        ]
    }
}

struct TablePlugin;

impl EditorPlugin for TablePlugin {
    fn id(&self) -> &'static str {
        "table"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("table.insert", "Insert table", |editor, args| {
                let rows = arg(&args, "rows")
                    .and_then(Value::as_u64)
                    .unwrap_or(2)
                    .clamp(1, table::MAX_TABLE_DIM as u64) as usize;
                let cols = arg(&args, "cols")
                    .and_then(Value::as_u64)
                    .unwrap_or(2)
                    .clamp(1, table::MAX_TABLE_DIM as u64) as usize;
                Ok(table::toggle_table(editor, rows, cols)?)
            })
            .description("Insert a table, or remove the table around the caret.")
            .keywords(["table", "grid"])
            .args_example(serde_json::json!({ "rows": 2, "cols": 3 })),
        ]
    }
}

struct DecoratorPlugin;

impl EditorPlugin for DecoratorPlugin {
    fn id(&self) -> &'static str {
        "decorator"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("decorator.insert", "Insert block", |editor, args| {
                let payload = args.ok_or_else(|| CommandError::new("Missing decorator payload"))?;
                let node: Decorator = serde_json::from_value(payload)
                    .map_err(|err| CommandError::new(format!("Invalid decorator payload: {err}")))?;
                Ok(decorator::insert_decorator(editor, node)?.is_some())
            })
            .description("Insert an image, video, card, thumbnail, callout or rule after the current block.")
            .keywords(["image", "video", "card", "thumbnail", "callout", "divider", "embed"])
            .args_example(serde_json::json!({ "type": "image", "src": "a.png", "alt": "" })),
            CommandSpec::new("decorator.remove", "Remove block", |editor, args| {
                let key = required_key(&args)?;
                Ok(decorator::remove_decorator(editor, key)?)
            })
            .args_example(serde_json::json!({ "key": 12 })),
            CommandSpec::new("decorator.move_up", "Move block up", |editor, args| {
                let key = required_key(&args)?;
                Ok(decorator::move_decorator(editor, key, decorator::MoveDirection::Up)?)
            }),
            CommandSpec::new("decorator.move_down", "Move block down", |editor, args| {
                let key = required_key(&args)?;
                Ok(decorator::move_decorator(editor, key, decorator::MoveDirection::Down)?)
            }),
            CommandSpec::new("decorator.duplicate", "Duplicate block", |editor, args| {
                let key = required_key(&args)?;
                Ok(decorator::duplicate_decorator(editor, key)?.is_some())
            }),
            CommandSpec::new("decorator.update", "Update block", |editor, args| {
                let key = required_key(&args)?;
                let fields = arg(&args, "fields")
                    .and_then(Value::as_object)
                    .ok_or_else(|| CommandError::new("Missing args.fields"))?
                    .clone();
                Ok(decorator::update_decorator(editor, key, &fields)?)
            })
            .description("Merge fields into a block's payload.")
            .args_example(serde_json::json!({ "key": 12, "fields": { "alt": "A cat" } })),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn richtext_registers_every_command_once() {
        let registry = PluginRegistry::richtext();
        for id in [
            "format.bold",
            "format.superscript",
            "format.text",
            "format.block",
            "list.toggle",
            "align.set",
            "indent.increase",
            "indent.decrease",
            "style.set",
            "link.insert",
            "link.remove",
            "table.insert",
            "text.insert",
            "text.delete_backward",
            "text.delete_forward",
            "text.insert_paragraph",
            "text.paste",
            "selection.select_all",
            "decorator.insert",
            "decorator.remove",
            "decorator.move_up",
            "decorator.move_down",
            "decorator.duplicate",
            "decorator.update",
            "history.undo",
            "history.redo",
        ] {
            assert!(registry.command(id).is_some(), "missing command {id}");
        }
        assert_eq!(registry.plugin_ids().len(), 10);
    }

    #[test]
    fn duplicate_plugin_is_rejected() {
        let mut registry = PluginRegistry::core();
        assert!(registry.register_plugin(Box::new(HistoryPlugin)).is_err());
    }
}
