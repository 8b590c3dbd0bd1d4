use std::cell::Cell;
use std::rc::Rc;

use manos_plate::{
    ToolbarAction, ToolbarError, ToolbarIcon, ToolbarItemKind, ToolbarOptions, ToolbarRegistry,
    ToolbarState, ToolbarStore, default_toolbar_items,
};
use manos_plate_core::{EditorConfig, TextFormat, TextFormatType};
use serde_json::json;

fn ids(registry: &ToolbarRegistry) -> Vec<String> {
    registry.snapshot().iter().map(|item| item.id.clone()).collect()
}

#[test]
fn re_registering_an_id_updates_it_in_place() {
    let registry = ToolbarRegistry::new();
    let _bold = registry.register("bold", ToolbarOptions::command(ToolbarIcon::Bold, "Bold"));
    let _italic = registry.register("italic", ToolbarOptions::command(ToolbarIcon::Italic, "Italic"));
    let _bold_again = registry.register(
        "bold",
        ToolbarOptions::command(ToolbarIcon::Highlighter, "Bold"),
    );

    assert_eq!(ids(&registry), vec!["bold", "italic"]);
    let bold = registry.get("bold").unwrap();
    assert_eq!(bold.kind, ToolbarItemKind::Command);
    assert_eq!(bold.icon, Some(ToolbarIcon::Highlighter));
}

#[test]
fn equal_options_keep_the_snapshot() {
    let registry = ToolbarRegistry::new();
    let notified = Rc::new(Cell::new(0));
    let counter = notified.clone();
    registry.subscribe(move |_| counter.set(counter.get() + 1));

    let _first = registry.register("undo", ToolbarOptions::command(ToolbarIcon::Undo2, "Undo"));
    let before = registry.snapshot();
    let _second = registry.register("undo", ToolbarOptions::command(ToolbarIcon::Undo2, "Undo"));
    assert!(Rc::ptr_eq(&before, &registry.snapshot()));
    assert_eq!(notified.get(), 1);

    let _third = registry.register(
        "undo",
        ToolbarOptions::command(ToolbarIcon::Undo2, "Undo").payload(json!({ "command": "history.undo" })),
    );
    assert!(!Rc::ptr_eq(&before, &registry.snapshot()));
    assert_eq!(notified.get(), 2);
}

#[test]
fn guards_unregister_on_drop_and_by_subset() {
    let registry = ToolbarRegistry::new();
    let mut group = registry.register_all(default_toolbar_items());
    let total = registry.len();
    assert!(total > 10);
    assert_eq!(group.ids().len(), total);

    assert!(group.unregister(Some(&["bold", "italic"])));
    assert_eq!(registry.len(), total - 2);
    assert!(registry.get("bold").is_none());
    assert!(!group.unregister(Some(&["bold", "missing"])));

    let single = registry.register("bold", ToolbarOptions::command(ToolbarIcon::Bold, "Bold"));
    drop(group);
    assert_eq!(ids(&registry), vec!["bold"]);
    drop(single);
    assert!(registry.is_empty());
}

#[test]
fn explicit_unregister_and_clear() {
    let registry = ToolbarRegistry::new();
    let _items = registry.register_all([
        ("a", ToolbarOptions::command(ToolbarIcon::Plus, "A")),
        ("b", ToolbarOptions::command(ToolbarIcon::Minus, "B")),
        ("c", ToolbarOptions::command(ToolbarIcon::Pen, "C")),
    ]);
    assert!(!registry.unregister(&["zzz"]));
    assert!(registry.unregister(&["b"]));
    assert_eq!(ids(&registry), vec!["a", "c"]);
    registry.clear();
    assert!(registry.is_empty());
}

#[test]
fn subscribers_can_read_the_registry_while_notified() {
    let registry = ToolbarRegistry::new();
    let seen = Rc::new(Cell::new(0));
    let inner = registry.clone();
    let counter = seen.clone();
    let id = registry.subscribe(move |items| {
        assert_eq!(items.len(), inner.len());
        counter.set(items.len());
    });
    let _a = registry.register("a", ToolbarOptions::command(ToolbarIcon::Plus, "A"));
    assert_eq!(seen.get(), 1);
    assert!(registry.unsubscribe(id));
    let _b = registry.register("b", ToolbarOptions::command(ToolbarIcon::Plus, "B"));
    assert_eq!(seen.get(), 1);
}

#[test]
fn set_all_replaces_the_active_set() {
    let mut store = ToolbarStore::new(ToolbarState::new(&EditorConfig::default().with_defaults()));
    store.dispatch(ToolbarAction::Activate(TextFormatType::Bold));
    let next = TextFormat::EMPTY.with(TextFormatType::Italic, true);
    assert!(store.dispatch(ToolbarAction::SetAll(next)).state_changed);
    assert!(!store.state().is_active(TextFormatType::Bold));
    assert!(store.state().is_active(TextFormatType::Italic));
}

#[test]
fn wire_actions_parse_at_the_boundary() {
    let action = ToolbarAction::from_json(&json!({ "type": "set_all", "formats": ["bold", "code"] })).unwrap();
    let expected = TextFormat::EMPTY
        .with(TextFormatType::Bold, true)
        .with(TextFormatType::Code, true);
    assert_eq!(action, ToolbarAction::SetAll(expected));

    let err = ToolbarAction::from_json(&json!({ "type": "set_all", "formats": ["bold", "sparkle"] }));
    assert_eq!(err, Err(ToolbarError::UnknownFormat("sparkle".to_string())));
    assert!(matches!(
        ToolbarAction::from_json(&json!({ "type": "activate" })),
        Err(ToolbarError::InvalidAction(_))
    ));
}
