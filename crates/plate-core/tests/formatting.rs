use manos_plate_core::{
    Alignment, BlockType, Editor, NodeKey, NodeKind, Point, Selection, TextFormatType,
};
use serde_json::json;

fn editor_with(markdown: &str) -> Editor {
    let mut editor = Editor::with_richtext_plugins();
    editor.import(markdown).unwrap();
    editor
}

fn first_text(editor: &Editor) -> NodeKey {
    editor.read(|state| state.text_nodes()[0])
}

fn select(editor: &mut Editor, key: NodeKey, start: usize, end: usize) {
    assert!(editor.set_selection(Some(Selection::range(
        Point::new(key, start),
        Point::new(key, end)
    ))));
}

fn run_with_text(editor: &Editor, text: &str) -> Option<NodeKey> {
    editor.read(|state| {
        state
            .text_nodes()
            .into_iter()
            .find(|k| state.text(*k).is_some_and(|t| t.text == text))
    })
}

#[test]
fn bold_toggles_on_and_off_for_a_range() {
    let mut editor = editor_with("hello world");
    let text = first_text(&editor);
    select(&mut editor, text, 0, 5);

    assert!(editor.run_command("format.bold", None).unwrap());
    assert!(editor.selection_attributes().formats.has(TextFormatType::Bold));
    let run = run_with_text(&editor, "hello").unwrap();
    assert!(editor.read(|s| s.text(run).unwrap().format.has(TextFormatType::Bold)));
    let rest = run_with_text(&editor, " world").unwrap();
    assert!(editor.read(|s| s.text(rest).unwrap().format.is_empty()));

    assert!(editor.run_command("format.bold", None).unwrap());
    assert!(!editor.selection_attributes().formats.has(TextFormatType::Bold));
    editor.read(|state| {
        let runs = state.text_nodes();
        assert_eq!(runs.len(), 1);
        assert!(state.text(runs[0]).unwrap().format.is_empty());
        assert_eq!(state.text(runs[0]).unwrap().text, "hello world");
    });
}

#[test]
fn mixed_range_sets_format_everywhere_first() {
    let mut editor = editor_with("**bold** plain");
    editor.run_command("selection.select_all", None).unwrap();
    assert!(!editor.selection_attributes().formats.has(TextFormatType::Bold));

    editor.run_command("format.text", Some(json!({ "format": "bold" }))).unwrap();
    assert!(editor.selection_attributes().formats.has(TextFormatType::Bold));
    editor.read(|state| {
        assert!(
            state
                .text_nodes()
                .iter()
                .all(|k| state.text(*k).unwrap().format.has(TextFormatType::Bold))
        );
    });
}

#[test]
fn collapsed_toggle_sets_a_pending_format_for_the_next_insert() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("format.italic", None).unwrap();
    assert!(editor.selection_attributes().formats.has(TextFormatType::Italic));
    assert!(editor.run_query::<bool>("format.is_active", Some(json!({ "format": "italic" }))).unwrap());

    editor.run_command("text.insert", Some(json!({ "text": "slanted" }))).unwrap();
    let run = run_with_text(&editor, "slanted").unwrap();
    assert!(editor.read(|s| s.text(run).unwrap().format.has(TextFormatType::Italic)));
}

#[test]
fn subscript_and_superscript_exclude_each_other() {
    let mut editor = editor_with("x2");
    let text = first_text(&editor);
    select(&mut editor, text, 1, 2);
    editor.run_command("format.subscript", None).unwrap();
    editor.run_command("format.superscript", None).unwrap();
    let formats = editor.selection_attributes().formats;
    assert!(formats.has(TextFormatType::Superscript));
    assert!(!formats.has(TextFormatType::Subscript));
}

#[test]
fn unknown_format_name_is_rejected() {
    let mut editor = Editor::with_richtext_plugins();
    assert!(editor.run_command("format.text", Some(json!({ "format": "blink" }))).is_err());
}

#[test]
fn format_block_changes_kind_in_place() {
    let mut editor = editor_with("Title **text**");
    let block = editor.read(|s| s.children(s.root())[0]);
    editor.run_command("format.block", Some(json!({ "block": "h2" }))).unwrap();
    editor.read(|state| {
        assert_eq!(state.node(block).unwrap().kind, NodeKind::Heading(2));
        assert_eq!(state.children(block).len(), 2);
    });
    assert_eq!(editor.selection_attributes().block_type, BlockType::Heading(2));
    assert_eq!(editor.selection_attributes().font_size, Some(24.0));

    editor.run_command("format.block", Some(json!({ "block": "quote" }))).unwrap();
    assert_eq!(editor.selection_attributes().block_type, BlockType::Quote);
}

#[test]
fn format_block_with_a_list_target_wraps() {
    let mut editor = editor_with("item");
    editor.run_command("format.block", Some(json!({ "block": "number" }))).unwrap();
    assert_eq!(editor.selection_attributes().block_type, BlockType::Number);
    editor.read(|state| {
        let list = state.children(state.root())[0];
        assert_eq!(
            state.node(list).unwrap().kind,
            NodeKind::List(manos_plate_core::ListType::Number)
        );
    });

    editor.run_command("format.block", Some(json!({ "block": "paragraph" }))).unwrap();
    assert_eq!(editor.selection_attributes().block_type, BlockType::Paragraph);
}

#[test]
fn enter_after_a_heading_continues_as_paragraph() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("format.block", Some(json!({ "block": "h1" }))).unwrap();
    editor.run_command("text.insert", Some(json!({ "text": "Title" }))).unwrap();
    editor.run_command("text.insert_paragraph", None).unwrap();
    editor.read(|state| {
        let blocks = state.children(state.root());
        assert_eq!(blocks.len(), 2);
        assert_eq!(state.node(blocks[1]).unwrap().kind, NodeKind::Paragraph);
    });
    assert_eq!(editor.selection_attributes().block_type, BlockType::Paragraph);
}

#[test]
fn alignment_is_stored_on_blocks_and_reported() {
    let mut editor = editor_with("one\n\ntwo");
    editor.run_command("selection.select_all", None).unwrap();
    assert!(editor.run_command("align.set", Some(json!({ "align": "center" }))).unwrap());
    assert_eq!(editor.selection_attributes().alignment, Some(Alignment::Center));
    assert!(!editor.run_command("align.set", Some(json!({ "align": "center" }))).unwrap());

    let first = first_text(&editor);
    editor.set_selection(Some(Selection::caret(first, 0)));
    editor.run_command("align.set", Some(json!({ "align": "right" }))).unwrap();
    editor.run_command("selection.select_all", None).unwrap();
    assert_eq!(editor.selection_attributes().alignment, None);
}

#[test]
fn indent_steps_padding_and_clamps_at_zero() {
    let mut editor = editor_with("para");
    let block = editor.read(|s| s.children(s.root())[0]);
    let padding = |editor: &Editor| {
        editor.read(|s| s.node(block).unwrap().style_value("padding-left").map(str::to_string))
    };

    editor.run_command("indent.increase", None).unwrap();
    editor.run_command("indent.increase", None).unwrap();
    assert_eq!(padding(&editor).as_deref(), Some("80px"));
    editor.run_command("indent.decrease", None).unwrap();
    assert_eq!(padding(&editor).as_deref(), Some("40px"));
    editor.run_command("indent.decrease", None).unwrap();
    assert_eq!(padding(&editor), None);
    assert!(!editor.run_command("indent.decrease", None).unwrap());
}

#[test]
fn style_on_a_range_patches_only_the_selected_runs() {
    let mut editor = editor_with("small big");
    let text = first_text(&editor);
    select(&mut editor, text, 6, 9);
    editor
        .run_command("style.set", Some(json!({ "property": "fontSize", "value": "24" })))
        .unwrap();
    assert_eq!(editor.selection_attributes().font_size, Some(24.0));
    let big = run_with_text(&editor, "big").unwrap();
    assert_eq!(
        editor.read(|s| s.node(big).unwrap().style_value("font-size").map(str::to_string)),
        Some("24px".to_string())
    );

    editor.run_command("selection.select_all", None).unwrap();
    assert_eq!(editor.selection_attributes().font_size, None);

    editor
        .run_command("style.set", Some(json!({ "property": "font-size", "value": null })))
        .unwrap();
    assert_eq!(editor.selection_attributes().font_size, Some(16.0));
}

#[test]
fn color_inherits_from_the_block() {
    let mut editor = editor_with("tinted");
    editor
        .run_command("style.set", Some(json!({ "property": "color", "value": "#ff0000" })))
        .unwrap();
    let attrs = editor.selection_attributes();
    assert_eq!(attrs.color.as_deref(), Some("#ff0000"));
    assert_eq!(attrs.background.as_deref(), Some("transparent"));
    assert_eq!(attrs.font_family.as_deref(), Some("Arial"));
}

#[test]
fn unusable_style_value_is_an_error() {
    let mut editor = editor_with("text");
    let err = editor
        .run_command("style.set", Some(json!({ "property": "font-size", "value": "huge" })))
        .unwrap_err();
    assert!(err.message().starts_with("invalid argument"), "{err}");
    assert!(
        editor
            .run_command("style.set", Some(json!({ "property": "margin", "value": "1px" })))
            .is_err()
    );
}
