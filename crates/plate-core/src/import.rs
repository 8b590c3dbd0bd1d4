use std::fmt;

use thiserror::Error;

use crate::core::{Editor, EditorError};
use crate::fragment::{NodeTree, replace_document};
use crate::html::{html_to_tree, tree_to_html};
use crate::markdown::{markdown_to_tree, tree_to_markdown};
use crate::node::NodeKind;
use crate::serde_value::PlateValue;
use crate::state::EditorState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportFormat {
    Json,
    Markdown,
    Html,
}

impl ImportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportFormat::Json => "json",
            ImportFormat::Markdown => "markdown",
            ImportFormat::Html => "html",
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    #[error("no import stage accepted the input (json: {json}; markdown: {markdown}; html: {html})")]
    NoStageAccepted {
        json: String,
        markdown: String,
        html: String,
    },
    #[error(transparent)]
    Editor(#[from] EditorError),
}

fn document_tree(state: &EditorState) -> NodeTree {
    NodeTree::from_state(state, state.root()).unwrap_or_else(|| NodeTree::new(NodeKind::Root))
}

pub fn export_json(state: &EditorState) -> Result<String, serde_json::Error> {
    PlateValue::from_state(state).to_json_pretty()
}

pub fn export_html(state: &EditorState) -> String {
    tree_to_html(&document_tree(state))
}

pub fn export_markdown(state: &EditorState) -> String {
    tree_to_markdown(&document_tree(state))
}

/// Runs the JSON, Markdown and HTML parsers in that order and returns the
/// first tree that parses and validates.
pub fn parse_document(input: &str) -> Result<(ImportFormat, NodeTree), ImportError> {
    let json = PlateValue::from_json_str(input)
        .map_err(|err| err.to_string())
        .and_then(PlateValue::into_tree);
    let json = match json {
        Ok(tree) => return Ok((ImportFormat::Json, tree)),
        Err(err) => {
            tracing::warn!(stage = "json", error = %err, "import stage failed");
            err
        }
    };

    let markdown = match markdown_to_tree(input) {
        Ok(tree) => return Ok((ImportFormat::Markdown, tree)),
        Err(err) => {
            tracing::warn!(stage = "markdown", error = %err, "import stage failed");
            err
        }
    };

    let html = match html_to_tree(input) {
        Some(tree) => match tree.validate() {
            Ok(()) => return Ok((ImportFormat::Html, tree)),
            Err(err) => err,
        },
        None => "no block content".to_string(),
    };
    tracing::warn!(stage = "html", error = %html, "import stage failed");
    Err(ImportError::NoStageAccepted {
        json,
        markdown,
        html,
    })
}

impl Editor {
    /// Replaces the document with `input`. On failure the document and the
    /// selection stay as they were.
    pub fn import(&mut self, input: &str) -> Result<ImportFormat, ImportError> {
        let (format, tree) = parse_document(input)?;
        let source = format!("import:{format}");
        self.transact_from(&source, |tx| {
            replace_document(tx, &tree);
            Ok(())
        })?;
        tracing::debug!(%format, "document imported");
        Ok(format)
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        export_json(&self.state())
    }

    pub fn export_html(&self) -> String {
        export_html(&self.state())
    }

    pub fn export_markdown(&self) -> String {
        export_markdown(&self.state())
    }
}
