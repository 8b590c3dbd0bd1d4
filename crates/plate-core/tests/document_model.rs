use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use manos_plate_core::{
    AbortController, Editor, EditorError, EditorState, NodeKind, PluginRegistry, Selection,
    TextFormat,
};

fn paragraph_texts(editor: &Editor) -> Vec<String> {
    editor.read(|state| {
        state
            .children(state.root())
            .iter()
            .map(|k| state.text_content(*k))
            .collect()
    })
}

#[test]
fn empty_document_has_root_paragraph_and_text() {
    let editor = Editor::with_richtext_plugins();
    editor.read(|state| {
        assert_eq!(state.check_integrity(), Ok(()));
        let blocks = state.children(state.root());
        assert_eq!(blocks.len(), 1);
        assert_eq!(state.node(blocks[0]).map(|n| n.kind.clone()), Some(NodeKind::Paragraph));
        let texts = state.text_nodes();
        assert_eq!(texts.len(), 1);
        assert_eq!(state.text(texts[0]).map(|t| t.text.as_str()), Some(""));
    });
    assert!(editor.selection().is_some_and(Selection::is_collapsed));
}

#[test]
fn failed_transaction_keeps_the_snapshot_and_fires_nothing() {
    let mut editor = Editor::with_richtext_plugins();
    let fired = Rc::new(Cell::new(0));
    let counter = fired.clone();
    editor.register_update_listener(None, move |_| counter.set(counter.get() + 1));

    let before = editor.state();
    let mut inserted = None;
    let result: Result<(), EditorError> = editor.transact(|tx| {
        let (paragraph, _) = tx.create_text_block(NodeKind::Paragraph, "doomed");
        let root = tx.root();
        assert!(tx.append(root, paragraph));
        inserted = Some(paragraph);
        Err(EditorError::Aborted("boom".into()))
    });

    assert!(matches!(result, Err(EditorError::Aborted(_))));
    assert!(Arc::ptr_eq(&before, &editor.state()));
    let inserted = inserted.unwrap();
    assert!(!editor.read(|state| state.contains(inserted)));
    assert_eq!(fired.get(), 0);
    assert!(!editor.can_undo());
}

#[test]
fn successful_transaction_publishes_a_new_snapshot() {
    let mut editor = Editor::with_richtext_plugins();
    let events = Rc::new(Cell::new(0));
    let counter = events.clone();
    editor.register_update_listener(None, move |event| {
        assert!(!Arc::ptr_eq(&event.state, &event.previous));
        assert!(!event.dirty.is_empty());
        counter.set(counter.get() + 1);
    });

    let before = editor.state();
    editor
        .transact(|tx| {
            let (paragraph, _) = tx.create_text_block(NodeKind::Paragraph, "second");
            let root = tx.root();
            tx.append(root, paragraph);
            Ok(())
        })
        .unwrap();

    assert!(!Arc::ptr_eq(&before, &editor.state()));
    assert_eq!(events.get(), 1);
    assert_eq!(paragraph_texts(&editor), vec!["".to_string(), "second".to_string()]);
    // The old snapshot is untouched.
    assert_eq!(before.children(before.root()).len(), 1);
    editor.read(|state| assert_eq!(state.check_integrity(), Ok(())));
}

#[test]
fn untouched_nodes_are_shared_between_snapshots() {
    let mut editor = Editor::with_richtext_plugins();
    editor.import("first\n\nsecond").unwrap();
    let before = editor.state();
    let second = before.children(before.root())[1];
    editor.run_command("text.insert", Some(serde_json::json!({ "text": "x" }))).unwrap();
    let after = editor.state();
    assert!(std::ptr::eq(
        before.node(second).unwrap(),
        after.node(second).unwrap()
    ));
}

#[test]
fn structural_ops_refuse_stale_keys_without_panicking() {
    let mut editor = Editor::with_richtext_plugins();
    let mut stale = None;
    editor
        .transact(|tx| {
            let text = tx.create_text("gone", TextFormat::EMPTY);
            tx.remove(text);
            stale = Some(text);
            assert!(!tx.remove(text));
            assert!(!tx.append(tx.root(), text));
            assert!(tx.writable(text).is_none());
            assert!(tx.clone_node(text).is_none());
            Ok(())
        })
        .unwrap();
    let stale = stale.unwrap();
    assert!(editor.read(|state| state.node(stale).is_none()));
}

#[test]
fn normalization_restores_required_structure() {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .transact(|tx| {
            tx.clear_root();
            Ok(())
        })
        .unwrap();
    editor.read(|state| {
        assert_eq!(state.check_integrity(), Ok(()));
        assert_eq!(state.children(state.root()).len(), 1);
        assert_eq!(state.text_nodes().len(), 1);
    });
    let selection = editor.selection().cloned().unwrap();
    assert!(editor.read(|state| state.is_valid_point(&selection.anchor)));
}

#[test]
fn adjacent_runs_with_equal_format_are_merged() {
    let mut editor = Editor::with_richtext_plugins();
    editor
        .transact(|tx| {
            let block = tx.children(tx.root())[0];
            let a = tx.create_text("ab", TextFormat::EMPTY);
            let b = tx.create_text("cd", TextFormat::EMPTY);
            tx.append(block, a);
            tx.append(block, b);
            Ok(())
        })
        .unwrap();
    editor.read(|state| {
        let block = state.children(state.root())[0];
        assert_eq!(state.children(block).len(), 1);
        assert_eq!(state.text_content(block), "abcd");
    });
}

#[test]
fn aborting_a_controller_tears_down_its_listeners() {
    let mut editor = Editor::with_richtext_plugins();
    let controller = AbortController::new();
    let calls = Rc::new(Cell::new(0));
    for _ in 0..2 {
        let counter = calls.clone();
        editor.register_update_listener(Some(controller.signal()), move |_| {
            counter.set(counter.get() + 1)
        });
    }
    let counter = calls.clone();
    editor.register_selection_listener(Some(controller.signal()), move |_| {
        counter.set(counter.get() + 10)
    });
    assert_eq!(editor.listener_count(), 3);

    editor.run_command("text.insert", Some(serde_json::json!({ "text": "a" }))).unwrap();
    assert_eq!(calls.get(), 12);

    controller.abort();
    editor.run_command("text.insert", Some(serde_json::json!({ "text": "b" }))).unwrap();
    assert_eq!(calls.get(), 12);
    assert_eq!(editor.listener_count(), 0);
}

#[test]
fn removed_listener_stops_receiving() {
    let mut editor = Editor::with_richtext_plugins();
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let id = editor.register_update_listener(None, move |_| counter.set(counter.get() + 1));
    assert!(editor.remove_listener(id));
    assert!(!editor.remove_listener(id));
    editor.run_command("text.insert", Some(serde_json::json!({ "text": "a" }))).unwrap();
    assert_eq!(calls.get(), 0);
}

#[test]
fn undo_and_redo_restore_snapshots() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("text.insert", Some(serde_json::json!({ "text": "hello" }))).unwrap();
    let typed = editor.state();
    assert_eq!(paragraph_texts(&editor), vec!["hello".to_string()]);

    assert!(editor.run_command("history.undo", None).unwrap());
    assert_eq!(paragraph_texts(&editor), vec!["".to_string()]);
    assert!(editor.can_redo());

    assert!(editor.run_command("history.redo", None).unwrap());
    assert!(Arc::ptr_eq(&typed, &editor.state()));
    assert!(!editor.run_command("history.redo", None).unwrap());
}

#[test]
fn new_change_clears_redo() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("text.insert", Some(serde_json::json!({ "text": "a" }))).unwrap();
    assert!(editor.undo());
    editor.run_command("text.insert", Some(serde_json::json!({ "text": "b" }))).unwrap();
    assert!(!editor.can_redo());
}

#[test]
fn undo_history_is_bounded_by_config() {
    let config = manos_plate_core::EditorConfig::from_json_str(r#"{"max_undo": 2}"#).unwrap();
    let mut editor = Editor::new(EditorState::empty(), PluginRegistry::richtext()).with_config(config);
    for ch in ["a", "b", "c", "d"] {
        editor.run_command("text.insert", Some(serde_json::json!({ "text": ch }))).unwrap();
    }
    assert!(editor.undo());
    assert!(editor.undo());
    assert!(!editor.undo());
    assert_eq!(paragraph_texts(&editor), vec!["ab".to_string()]);

    assert!(editor.redo());
    assert!(editor.redo());
    assert!(!editor.redo());
    assert_eq!(paragraph_texts(&editor), vec!["abcd".to_string()]);
    assert!(editor.undo());
    assert_eq!(paragraph_texts(&editor), vec!["abc".to_string()]);
}

#[test]
fn config_fills_missing_fields_with_defaults() {
    let config = manos_plate_core::EditorConfig::from_json_str(r#"{"indent_step_px": 24}"#).unwrap();
    assert_eq!(config.indent_step_px, 24.0);
    assert_eq!(config.max_undo, 200);
    assert_eq!(config.max_normalize_iterations, 100);
    assert_eq!(config.default_font_family, "Arial");
    assert_eq!(config.default_font_size, 16.0);
}

#[test]
fn stale_selection_is_rejected() {
    let mut editor = Editor::with_richtext_plugins();
    let text = editor.read(|state| state.text_nodes()[0]);
    assert!(!editor.set_selection(Some(Selection::caret(text, 5))));
    assert!(editor.set_selection(Some(Selection::caret(text, 0))));
}

#[test]
fn unknown_command_is_an_error_and_unsupported_context_is_not() {
    let mut editor = Editor::with_richtext_plugins();
    assert!(editor.run_command("nope", None).is_err());
    assert!(editor.run_command("text.insert", None).is_err());
    editor.set_selection(None);
    assert!(!editor.run_command("format.bold", None).unwrap());
}

#[test]
fn document_text_query_concatenates_blocks() {
    let mut editor = Editor::with_richtext_plugins();
    editor.import("one\n\ntwo").unwrap();
    let text: String = editor.run_query("document.text", None).unwrap();
    assert_eq!(text, "one\ntwo");
}
