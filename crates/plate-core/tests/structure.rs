use manos_plate_core::{
    BlockType, Decorator, Editor, ListType, NodeKey, NodeKind, Point, Selection,
};
use serde_json::json;

fn editor_with(markdown: &str) -> Editor {
    let mut editor = Editor::with_richtext_plugins();
    editor.import(markdown).unwrap();
    editor
}

fn top_kinds(editor: &Editor) -> Vec<NodeKind> {
    editor.read(|state| {
        state
            .children(state.root())
            .iter()
            .filter_map(|k| state.node(*k).map(|n| n.kind.clone()))
            .collect()
    })
}

fn top_key(editor: &Editor, ix: usize) -> NodeKey {
    editor.read(|state| state.children(state.root())[ix])
}

fn assert_consistent(editor: &Editor) {
    editor.read(|state| assert_eq!(state.check_integrity(), Ok(())));
}

// ---- lists ----

#[test]
fn list_toggle_wraps_and_unwraps() {
    let mut editor = editor_with("one\n\ntwo");
    editor.run_command("selection.select_all", None).unwrap();

    assert!(editor.run_command("list.toggle", Some(json!({ "kind": "bullet" }))).unwrap());
    assert_eq!(top_kinds(&editor), vec![NodeKind::List(ListType::Bullet)]);
    let list = top_key(&editor, 0);
    assert_eq!(editor.read(|s| s.children(list).len()), 2);
    assert_eq!(editor.selection_attributes().block_type, BlockType::Bullet);

    assert!(editor.run_command("list.toggle", Some(json!({ "kind": "bullet" }))).unwrap());
    assert_eq!(top_kinds(&editor), vec![NodeKind::Paragraph, NodeKind::Paragraph]);
    assert_consistent(&editor);
}

#[test]
fn list_toggle_with_the_other_kind_retypes() {
    let mut editor = editor_with("- a\n- b");
    editor.run_command("selection.select_all", None).unwrap();
    editor.run_command("list.toggle", Some(json!({ "kind": "number" }))).unwrap();
    assert_eq!(top_kinds(&editor), vec![NodeKind::List(ListType::Number)]);
    assert_eq!(editor.selection_attributes().block_type, BlockType::Number);
}

#[test]
fn indent_nests_list_items_and_outdent_lifts_them() {
    let mut editor = editor_with("- a\n- b");
    let b = editor.read(|s| s.text_nodes()[1]);
    editor.set_selection(Some(Selection::caret(b, 0)));

    assert!(editor.run_command("indent.increase", None).unwrap());
    editor.read(|state| {
        let list = state.children(state.root())[0];
        assert_eq!(state.children(list).len(), 1);
        let path = state.path_of(b).unwrap();
        // root > list > item > nested list > item > text
        assert_eq!(path.len(), 5);
    });
    assert_eq!(
        manos_plate_core::export_markdown(&editor.state()),
        "- a\n    - b"
    );

    assert!(editor.run_command("indent.decrease", None).unwrap());
    editor.read(|state| {
        let list = state.children(state.root())[0];
        assert_eq!(state.children(list).len(), 2);
    });
    assert_consistent(&editor);
}

#[test]
fn first_item_cannot_nest() {
    let mut editor = editor_with("- a\n- b");
    assert!(!editor.run_command("indent.increase", None).unwrap());
}

#[test]
fn enter_in_an_empty_item_leaves_the_list() {
    let mut editor = editor_with("- a");
    let a = editor.read(|s| s.text_nodes()[0]);
    editor.set_selection(Some(Selection::caret(a, 1)));
    editor.run_command("text.insert_paragraph", None).unwrap();
    editor.read(|state| {
        let list = state.children(state.root())[0];
        assert_eq!(state.children(list).len(), 2);
    });
    editor.run_command("text.insert_paragraph", None).unwrap();
    assert_eq!(
        top_kinds(&editor),
        vec![NodeKind::List(ListType::Bullet), NodeKind::Paragraph]
    );
    assert_eq!(editor.selection_attributes().block_type, BlockType::Paragraph);
}

// ---- tables ----

#[test]
fn table_insert_builds_a_grid_and_moves_the_caret_inside() {
    let mut editor = Editor::with_richtext_plugins();
    assert!(editor.run_command("table.insert", Some(json!({ "rows": 2, "cols": 3 }))).unwrap());
    assert_eq!(
        top_kinds(&editor),
        vec![NodeKind::Paragraph, NodeKind::Table, NodeKind::Paragraph]
    );
    let table = top_key(&editor, 1);
    editor.read(|state| {
        let rows = state.children(table);
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(state.children(*row).len(), 3);
            for cell in state.children(*row) {
                assert_eq!(state.node(*cell).unwrap().kind, NodeKind::TableCell { header: false });
                assert_eq!(state.text_nodes_in(*cell).len(), 1);
            }
        }
    });
    assert_eq!(editor.selection_attributes().block_type, BlockType::TableCell);
    assert_consistent(&editor);
}

#[test]
fn table_insert_inside_a_table_removes_it() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("table.insert", Some(json!({ "rows": 1, "cols": 1 }))).unwrap();
    editor.run_command("text.insert", Some(json!({ "text": "cell" }))).unwrap();
    assert!(editor.run_command("table.insert", Some(json!({ "rows": 1, "cols": 1 }))).unwrap());
    assert_eq!(top_kinds(&editor), vec![NodeKind::Paragraph, NodeKind::Paragraph]);
    assert_eq!(editor.selection_attributes().block_type, BlockType::Paragraph);
    assert_consistent(&editor);
}

#[test]
fn table_dimensions_are_clamped() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("table.insert", Some(json!({ "rows": 0, "cols": 500 }))).unwrap();
    let table = top_key(&editor, 1);
    editor.read(|state| {
        let rows = state.children(table);
        assert_eq!(rows.len(), 1);
        assert_eq!(state.children(rows[0]).len(), 32);
    });
}

// ---- links ----

#[test]
fn link_wraps_the_selected_text() {
    let mut editor = editor_with("visit site now");
    let text = editor.read(|s| s.text_nodes()[0]);
    editor.set_selection(Some(Selection::range(Point::new(text, 6), Point::new(text, 10))));

    assert!(
        editor
            .run_command("link.insert", Some(json!({ "url": "https://example.com" })))
            .unwrap()
    );
    assert_eq!(editor.selection_attributes().link.as_deref(), Some("https://example.com"));
    assert_eq!(
        manos_plate_core::export_markdown(&editor.state()),
        "visit [site](https://example.com) now"
    );

    assert!(editor.run_command("link.remove", None).unwrap());
    assert_eq!(editor.selection_attributes().link, None);
    editor.read(|state| {
        assert_eq!(state.text_nodes().len(), 1);
        assert_eq!(state.text_content(state.root()), "visit site now");
    });
}

#[test]
fn relinking_a_link_changes_its_url() {
    let mut editor = editor_with("[site](https://a.test)");
    editor.run_command("selection.select_all", None).unwrap();
    editor.run_command("link.insert", Some(json!({ "url": "https://b.test" }))).unwrap();
    assert_eq!(
        manos_plate_core::export_markdown(&editor.state()),
        "[site](https://b.test)"
    );
}

#[test]
fn collapsed_link_insert_adds_a_labelled_run() {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .run_command(
            "link.insert",
            Some(json!({ "url": "https://docs.rs", "label": "Docs" })),
        )
        .unwrap();
    assert_eq!(
        manos_plate_core::export_markdown(&editor.state()),
        "[Docs](https://docs.rs)"
    );
    assert_eq!(editor.selection_attributes().link.as_deref(), Some("https://docs.rs"));
}

#[test]
fn empty_url_is_malformed() {
    let mut editor = Editor::with_richtext_plugins();
    assert!(editor.run_command("link.insert", Some(json!({ "url": "  " }))).is_err());
}

// ---- text editing ----

#[test]
fn backspace_at_block_start_merges_into_the_previous_block() {
    let mut editor = editor_with("one\n\ntwo");
    let two = editor.read(|s| s.text_nodes()[1]);
    editor.set_selection(Some(Selection::caret(two, 0)));
    assert!(editor.run_command("text.delete_backward", None).unwrap());
    editor.read(|state| {
        assert_eq!(state.children(state.root()).len(), 1);
        assert_eq!(state.text_content(state.root()), "onetwo");
    });
    let caret = editor.selection().unwrap().anchor;
    assert_eq!(editor.read(|s| s.text(caret.key).map(|t| t.text[..caret.offset].to_string())), Some("one".to_string()));
}

#[test]
fn deleting_a_range_across_blocks_joins_them() {
    let mut editor = editor_with("hello\n\nworld");
    let (a, b) = editor.read(|s| (s.text_nodes()[0], s.text_nodes()[1]));
    editor.set_selection(Some(Selection::range(Point::new(a, 2), Point::new(b, 3))));
    editor.run_command("text.delete_forward", None).unwrap();
    assert_eq!(editor.read(|s| s.text_content(s.root())), "held");
}

#[test]
fn typing_replaces_the_selection() {
    let mut editor = editor_with("hello world");
    let text = editor.read(|s| s.text_nodes()[0]);
    editor.set_selection(Some(Selection::range(Point::new(text, 6), Point::new(text, 11))));
    editor.run_command("text.insert", Some(json!({ "text": "there" }))).unwrap();
    assert_eq!(editor.read(|s| s.text_content(s.root())), "hello there");
    assert!(editor.selection().unwrap().is_collapsed());
}

// ---- decorators ----

#[test]
fn decorator_insert_lands_after_the_current_block() {
    let mut editor = editor_with("before\n\nafter");
    assert!(
        editor
            .run_command("decorator.insert", Some(json!({ "type": "image", "src": "a.png" })))
            .unwrap()
    );
    let kinds = top_kinds(&editor);
    assert_eq!(kinds.len(), 3);
    assert_eq!(kinds[1], NodeKind::Decorator(Decorator::image("a.png")));
    let image = top_key(&editor, 1);
    editor.read(|state| {
        let node = state.node(image).unwrap();
        assert!(node.is_image());
        assert_eq!(node.as_image().map(|i| i.src.as_str()), Some("a.png"));
    });
    // Caret moved to the block that followed.
    assert_eq!(editor.read(|s| s.text_content(s.nearest_block(editor.selection().unwrap().anchor.key).unwrap())), "after");
}

#[test]
fn decorator_at_the_end_gets_a_trailing_paragraph() {
    let mut editor = Editor::with_richtext_plugins();
    let key = manos_plate_core::commands::decorator::insert_decorator(
        &mut editor,
        Decorator::HorizontalRule,
    )
    .unwrap()
    .unwrap();
    assert_eq!(
        top_kinds(&editor),
        vec![
            NodeKind::Paragraph,
            NodeKind::Decorator(Decorator::HorizontalRule),
            NodeKind::Paragraph
        ]
    );
    assert!(editor.read(|s| s.node(key).is_some_and(|n| n.is_horizontal_rule())));
}

#[test]
fn decorators_move_duplicate_and_remove() {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .run_command("decorator.insert", Some(json!({ "type": "card", "title": "T" })))
        .unwrap();
    let card = top_key(&editor, 1);

    assert!(editor.run_command("decorator.move_up", Some(json!({ "key": card }))).unwrap());
    assert_eq!(top_key(&editor, 0), card);
    assert!(!editor.run_command("decorator.move_up", Some(json!({ "key": card }))).unwrap());
    assert!(editor.run_command("decorator.move_down", Some(json!({ "key": card }))).unwrap());
    assert_eq!(top_key(&editor, 1), card);

    assert!(editor.run_command("decorator.duplicate", Some(json!({ "key": card }))).unwrap());
    let copy = top_key(&editor, 2);
    assert_ne!(copy, card);
    assert_eq!(
        editor.read(|s| s.node(copy).unwrap().kind.clone()),
        NodeKind::Decorator(Decorator::card("T", ""))
    );

    assert!(editor.run_command("decorator.remove", Some(json!({ "key": card }))).unwrap());
    assert!(editor.read(|s| s.node(card).is_none()));
    assert!(!editor.run_command("decorator.remove", Some(json!({ "key": card }))).unwrap());
    assert_consistent(&editor);
}

#[test]
fn decorator_update_is_copy_on_write() {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .run_command("decorator.insert", Some(json!({ "type": "image", "src": "a.png" })))
        .unwrap();
    let image = top_key(&editor, 1);
    let before = editor.state();

    assert!(
        editor
            .run_command(
                "decorator.update",
                Some(json!({ "key": image, "fields": { "alt": "A cat", "width": 320 } }))
            )
            .unwrap()
    );
    let alt = |state: &manos_plate_core::EditorState| {
        state.node(image).and_then(|n| n.as_image()).map(|i| (i.alt.clone(), i.width))
    };
    assert_eq!(alt(&before), Some((String::new(), None)));
    assert_eq!(editor.read(alt), Some(("A cat".to_string(), Some(320))));

    // Same values again change nothing.
    assert!(
        !editor
            .run_command("decorator.update", Some(json!({ "key": image, "fields": { "alt": "A cat" } })))
            .unwrap()
    );
    // A malformed field rejects the whole update.
    let current = editor.state();
    assert!(
        editor
            .run_command(
                "decorator.update",
                Some(json!({ "key": image, "fields": { "alt": "dog", "width": "wide" } }))
            )
            .is_err()
    );
    assert!(std::sync::Arc::ptr_eq(&current, &editor.state()));
}

#[test]
fn writable_accessor_only_matches_its_kind() {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .run_command("decorator.insert", Some(json!({ "type": "video", "src": "v.mp4" })))
        .unwrap();
    let video = top_key(&editor, 1);
    editor
        .transact(|tx| {
            assert!(tx.writable_image(video).is_none());
            if let Some(payload) = tx.writable_video(video) {
                payload.set_poster(Some("p.png".into()));
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(
        editor.read(|s| s.node(video).and_then(|n| n.as_video()).and_then(|v| v.poster.clone())),
        Some("p.png".to_string())
    );
}
