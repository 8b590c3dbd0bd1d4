use std::sync::Arc;

use manos_plate_core::{
    Decorator, Editor, ImportError, ImportFormat, ListType, NodeKind, NodeTree, PlateValue,
    Selection, TextFormatType, export_html, export_json, export_markdown, parse_document,
};
use serde_json::json;

fn document(editor: &Editor) -> NodeTree {
    editor.read(|state| NodeTree::from_state(state, state.root()).unwrap())
}

fn rich_editor() -> Editor {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .import(
            "# Title\n\nSome **bold** and _soft_ text with [a link](https://example.com).\n\n\
             - one\n- two\n    - nested\n\n1. first\n2. second\n\n> quoted\n\n\
             ```rust\nfn main() {}\n```\n\n| h1 | h2 |\n| --- | --- |\n| a | b |",
        )
        .unwrap();
    let quoted = editor.read(|state| {
        state
            .text_nodes()
            .into_iter()
            .find(|k| state.text(*k).is_some_and(|t| t.text == "quoted"))
            .unwrap()
    });
    editor.set_selection(Some(Selection::caret(quoted, 0)));
    editor
        .run_command(
            "decorator.insert",
            Some(json!({ "type": "callout", "variant": "warning", "body": "Careful" })),
        )
        .unwrap();
    editor
}

#[test]
fn heading_survives_a_json_round_trip() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("format.block", Some(json!({ "block": "h1" }))).unwrap();
    editor.run_command("text.insert", Some(json!({ "text": "Title" }))).unwrap();
    let json = editor.export_json().unwrap();

    let mut restored = Editor::with_richtext_plugins();
    assert_eq!(restored.import(&json).unwrap(), ImportFormat::Json);
    restored.read(|state| {
        let first = state.children(state.root())[0];
        assert_eq!(state.node(first).unwrap().kind, NodeKind::Heading(1));
        assert_eq!(state.text_content(first), "Title");
    });
}

#[test]
fn json_round_trip_preserves_the_whole_tree() -> anyhow::Result<()> {
    let editor = rich_editor();
    let json = export_json(&editor.state())?;

    let mut restored = Editor::with_richtext_plugins();
    assert_eq!(restored.import(&json)?, ImportFormat::Json);
    assert_eq!(document(&restored), document(&editor));
    assert_eq!(restored.export_json()?, json);
    Ok(())
}

#[test]
fn json_records_carry_type_and_version() {
    let editor = rich_editor();
    let value: serde_json::Value = serde_json::from_str(&editor.export_json().unwrap()).unwrap();
    assert_eq!(value["schema"], "manos-plate");
    assert_eq!(value["version"], 1);
    assert_eq!(value["root"]["type"], "root");
    let heading = &value["root"]["children"][0];
    assert_eq!(heading["type"], "heading");
    assert_eq!(heading["level"], 1);
    assert_eq!(heading["version"], 1);
    let callout = value["root"]["children"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["type"] == "callout")
        .cloned()
        .unwrap();
    assert_eq!(callout["variant"], "warning");
    assert_eq!(callout["body"], "Careful");
}

#[test]
fn invalid_nesting_in_json_is_rejected() {
    let json = r#"{"schema":"manos-plate","version":1,"root":{"type":"root","children":[
        {"type":"list","list_type":"bullet","children":[{"type":"paragraph","children":[{"type":"text","text":"x"}]}]}
    ]}}"#;
    let value = PlateValue::from_json_str(json).unwrap();
    assert!(value.into_tree().is_err());
}

#[test]
fn fallback_chain_picks_the_first_stage_that_accepts() {
    let editor = rich_editor();
    let json = export_json(&editor.state()).unwrap();
    assert_eq!(parse_document(&json).unwrap().0, ImportFormat::Json);

    // Valid JSON that is not a document falls through to Markdown.
    let (format, tree) = parse_document(r#"{"a":1}"#).unwrap();
    assert_eq!(format, ImportFormat::Markdown);
    assert_eq!(tree.text_content(), r#"{"a":1}"#);

    assert_eq!(parse_document("# Heading").unwrap().0, ImportFormat::Markdown);
    assert_eq!(
        parse_document("<p>Hello <b>world</b></p>").unwrap().0,
        ImportFormat::Html
    );
}

#[test]
fn failed_import_leaves_the_document_untouched() {
    let mut editor = rich_editor();
    let before = editor.state();
    let err = editor.import("   ").unwrap_err();
    assert!(matches!(err, ImportError::NoStageAccepted { .. }));
    assert!(Arc::ptr_eq(&before, &editor.state()));

    let err = editor.import("<!-- only a comment -->").unwrap_err();
    assert!(matches!(err, ImportError::NoStageAccepted { .. }));
    assert!(Arc::ptr_eq(&before, &editor.state()));
}

#[test]
fn import_is_undoable() {
    let mut editor = Editor::with_richtext_plugins();
    editor.import("replaced").unwrap();
    assert!(editor.undo());
    assert_eq!(editor.read(|s| s.text_content(s.root())), "");
}

#[test]
fn markdown_export_covers_every_block() {
    let editor = rich_editor();
    let md = export_markdown(&editor.state());
    let expected = [
        "# Title",
        "Some **bold** and _soft_ text with [a link](https://example.com).",
        "- one\n- two\n    - nested",
        "1. first\n2. second",
        "> quoted",
        "> Careful",
        "```rust\nfn main() {}\n```",
        "| h1 | h2 |\n| --- | --- |\n| a | b |",
    ];
    assert_eq!(md, expected.join("\n\n"));
}

#[test]
fn markdown_round_trip_keeps_structure() {
    let editor = rich_editor();
    let md = export_markdown(&editor.state());
    let mut restored = Editor::with_richtext_plugins();
    assert_eq!(restored.import(&md).unwrap(), ImportFormat::Markdown);
    assert_eq!(export_markdown(&restored.state()), md);
}

#[test]
fn markdown_import_reads_marks_and_escapes() {
    let (_, tree) = parse_document(r"**a ~~b~~** `c\*` \*d\*").unwrap();
    let para = &tree.children[0];
    let runs: Vec<(&str, bool, bool, bool)> = para
        .children
        .iter()
        .filter_map(|c| match &c.kind {
            NodeKind::Text(t) => Some((
                t.text.as_str(),
                t.format.has(TextFormatType::Bold),
                t.format.has(TextFormatType::Strikethrough),
                t.format.has(TextFormatType::Code),
            )),
            _ => None,
        })
        .collect();
    assert_eq!(
        runs,
        vec![
            ("a ", true, false, false),
            ("b", true, true, false),
            (" ", false, false, false),
            (r"c\*", false, false, true),
            (" *d*", false, false, false),
        ]
    );
}

#[test]
fn markdown_decorators_degrade() {
    let mut editor = Editor::with_richtext_plugins();
    for payload in [
        json!({ "type": "image", "src": "cat.png", "alt": "cat" }),
        json!({ "type": "video", "src": "clip.mp4" }),
        json!({ "type": "card", "title": "Card", "body": "Body" }),
        json!({ "type": "horizontal_rule" }),
    ] {
        editor.run_command("decorator.insert", Some(payload)).unwrap();
    }
    let md = export_markdown(&editor.state());
    assert!(md.contains("![cat](cat.png)"));
    assert!(md.contains("[clip.mp4](clip.mp4)"));
    assert!(md.contains("**Card**\n\nBody"));
    assert!(md.contains("---"));

    let (_, tree) = parse_document("![cat](cat.png)\n\n---").unwrap();
    let mut image = manos_plate_core::ImagePayload::new("cat.png");
    image.alt = "cat".into();
    assert_eq!(tree.children[0].kind, NodeKind::Decorator(Decorator::Image(image)));
    assert_eq!(tree.children[1].kind, NodeKind::Decorator(Decorator::HorizontalRule));
}

#[test]
fn html_export_is_escaped_and_tags_decorators() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("text.insert", Some(json!({ "text": "a < b & c" }))).unwrap();
    editor
        .run_command("decorator.insert", Some(json!({ "type": "image", "src": "a.png", "alt": "x\"y" })))
        .unwrap();
    let html = export_html(&editor.state());
    assert!(html.starts_with("<p>a &lt; b &amp; c</p>"));
    assert!(html.contains(r#"data-node="image""#));
    assert!(html.contains(r#"alt="x&quot;y""#));
}

#[test]
fn html_round_trip_restores_decorators_and_blocks() -> anyhow::Result<()> {
    let editor = rich_editor();
    let html = export_html(&editor.state());
    let mut restored = Editor::with_richtext_plugins();
    assert_eq!(restored.import(&html)?, ImportFormat::Html);
    assert_eq!(document(&restored), document(&editor));
    Ok(())
}

#[test]
fn html_import_maps_common_markup() {
    let (format, tree) = parse_document(
        "<h2>Head</h2><p>plain <strong>bold</strong> <em>it</em></p>\
         <ul><li>x</li><li>y<ol><li>z</li></ol></li></ul><img src=\"p.png\" alt=\"pic\"><hr>",
    )
    .unwrap();
    assert_eq!(format, ImportFormat::Html);
    let kinds: Vec<&NodeKind> = tree.children.iter().map(|c| &c.kind).collect();
    assert_eq!(kinds[0], &NodeKind::Heading(2));
    assert_eq!(kinds[1], &NodeKind::Paragraph);
    assert_eq!(kinds[2], &NodeKind::List(ListType::Bullet));
    assert!(matches!(kinds[3], NodeKind::Decorator(Decorator::Image(img)) if img.src == "p.png" && img.alt == "pic"));
    assert_eq!(kinds[4], &NodeKind::Decorator(Decorator::HorizontalRule));

    let nested = &tree.children[2].children[1];
    assert!(nested.children.iter().any(|c| c.kind == NodeKind::List(ListType::Number)));
}
