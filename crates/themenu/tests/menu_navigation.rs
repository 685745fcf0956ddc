use std::fs;
use std::time::{Duration, Instant};

use themenu::config::MenuConfig;
use themenu::tree::{InputSignal, MenuTree};

fn tree(json: &str) -> MenuTree {
    MenuTree::new(&MenuConfig::from_json(json).expect("valid menu"))
}

fn labels(tree: &MenuTree) -> Vec<String> {
    tree.current_items().iter().map(|e| e.label()).collect()
}

const NESTED: &str = r#"[
    {"label": "Top", "key": "t"},
    {"label": "Outer", "key": "o", "items": [
        {"label": "Inner", "key": "i", "items": [
            {"label": "Deep", "key": "d"}
        ]},
        {"label": "Same key", "key": "o"}
    ]}
]"#;

#[test]
fn press_enters_submenu_and_escape_returns_to_root() {
    let mut tree = tree(NESTED);
    assert_eq!(labels(&tree), ["Top", "Outer"]);

    tree.handle(InputSignal::Press("o".into()));
    assert_eq!(labels(&tree), ["Inner", "Same key"]);
    assert_eq!(tree.scope().unwrap().label(), "Outer");

    tree.handle(InputSignal::Escape);
    assert!(tree.scope().is_none());
    assert_eq!(labels(&tree), ["Top", "Outer"]);
}

#[test]
fn escape_from_nested_submenu_skips_intermediate_levels() {
    let mut tree = tree(NESTED);
    tree.press("o");
    tree.release("o");
    tree.press("i");
    tree.release("i");
    assert_eq!(labels(&tree), ["Deep"]);
    tree.reset_to_root();
    assert_eq!(labels(&tree), ["Top", "Outer"]);
}

#[test]
fn release_of_opening_key_does_not_trigger_submenu_item() {
    let mut tree = tree(NESTED);
    tree.press("o");
    assert!(tree.release("o").is_empty());
    assert_eq!(labels(&tree), ["Inner", "Same key"]);
    // A second press/release of the same key is a normal selection.
    tree.press("o");
    assert!(tree.current_items()[1].active());
    assert_eq!(tree.release("o").len(), 1);
    assert!(!tree.current_items()[1].active());
}

#[test]
fn unknown_and_empty_keys_do_nothing() {
    let mut tree = tree(NESTED);
    assert!(!tree.navigate("z"));
    assert!(!tree.navigate(""));
    tree.press("t");
    assert!(tree.scope().is_none());
    assert!(tree.root()[0].active());
    assert!(tree.release("z").is_empty());
}

#[test]
fn activate_scope_ignores_leaves() {
    let mut tree = tree(NESTED);
    let leaf = tree.root()[0].clone();
    tree.activate_scope(leaf);
    assert!(tree.scope().is_none());
    let branch = tree.root()[1].clone();
    tree.activate_scope(branch);
    assert_eq!(labels(&tree), ["Inner", "Same key"]);
}

#[test]
fn release_triggers_action_in_background() {
    let dir = tempfile::tempdir().expect("tempdir");
    let marker = dir.path().join("hit");
    let json = serde_json::json!([
        {"label": "Mark", "key": "m", "command": format!("echo hit > '{}'", marker.display())}
    ])
    .to_string();
    let mut tree = tree(&json);
    tree.press("m");
    let handles = tree.release("m");
    assert_eq!(handles.len(), 1);
    for h in handles {
        h.join().expect("trigger thread");
    }
    assert_eq!(fs::read_to_string(&marker).unwrap(), "hit\n");
}

#[test]
fn failing_action_surfaces_in_label_only() {
    let mut tree = tree(
        r#"[{"label": "Slow", "key": "s", "command": {"cmd": "sleep 5", "timeout": "50ms"}}]"#,
    );
    for h in tree.handle(InputSignal::Release("s".into())) {
        h.join().expect("dispatcher never lets the failure escape");
    }
    assert_eq!(tree.root()[0].label(), "command timed out after 50ms");
}

#[test]
fn start_brings_label_commands_up() {
    let tree = tree(r#"[{"key": "w", "label_command": "echo live"}]"#);
    tree.start();
    let start = Instant::now();
    while tree.root()[0].label() != "live" && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(tree.root()[0].label(), "live");
}
