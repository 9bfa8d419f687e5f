// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn blob(path: &str, size: u64) -> TreeEntry {
    TreeEntry { path: path.to_string(), kind: "blob".to_string(), size }
}

fn tree(path: &str) -> TreeEntry {
    TreeEntry { path: path.to_string(), kind: "tree".to_string(), size: 0 }
}

fn builder() -> ContextBuilder {
    ContextBuilder::new(15, 50 * 1024, 32 * 1024)
}

#[test]
fn filter_drops_directories_skips_and_oversize() {
    let entries = vec![
        blob("src/app.ts", 100),
        tree("src"),
        blob("node_modules/react/index.js", 100),
        blob("package-lock.json", 100),
        blob("assets/logo.png", 100),
        blob("src/huge.ts", 1024 * 1024),
    ];
    let kept: Vec<&str> = builder().filter_tree(&entries).iter().map(|e| e.path.as_str()).collect();
    assert_eq!(kept, vec!["src/app.ts"]);
}

#[test]
fn selection_prefers_root_config_and_entrypoints() {
    let mut entries = vec![
        blob("package.json", 200),
        blob("README.md", 200),
        blob("src/index.ts", 200),
        blob("src/deep/nested/helper.ts", 200),
    ];
    for i in 0..30 {
        entries.push(blob(&format!("src/components/c{i:02}.tsx"), 200));
    }

    let selected = builder().select_paths(&entries);
    assert_eq!(selected.len(), 15);
    assert_eq!(selected[0], "package.json");
    assert_eq!(selected[1], "README.md");
    assert_eq!(selected[2], "src/index.ts");
}

#[test]
fn must_include_beats_the_file_cap() {
    // More must-include files than the cap allows.
    let small = ContextBuilder::new(2, 50 * 1024, 32 * 1024);
    let entries = vec![
        blob("AGENTS.md", 100),
        blob("package.json", 100),
        blob("Cargo.toml", 100),
        blob("go.mod", 100),
        blob("src/a.ts", 100),
    ];

    let selected = small.select_paths(&entries);
    // All four must-include files survive a cap of two.
    assert!(selected.contains(&"AGENTS.md".to_string()));
    assert!(selected.contains(&"package.json".to_string()));
    assert!(selected.contains(&"Cargo.toml".to_string()));
    assert!(selected.contains(&"go.mod".to_string()));
    assert!(!selected.contains(&"src/a.ts".to_string()));
}

#[test]
fn byte_cap_bounds_non_essential_files() {
    let small = ContextBuilder::new(15, 500, 32 * 1024);
    let entries = vec![
        blob("package.json", 100),
        blob("src/index.ts", 300),
        blob("src/other.ts", 300),
    ];

    let selected = small.select_paths(&entries);
    assert!(selected.contains(&"package.json".to_string()));
    assert!(selected.contains(&"src/index.ts".to_string()));
    // Would exceed the byte budget.
    assert!(!selected.contains(&"src/other.ts".to_string()));
}

#[test]
fn nested_must_include_names_do_not_count() {
    let entries = vec![blob("examples/package.json", 100)];
    let selected = builder().select_paths(&entries);
    // Selected as an ordinary file, not as must-include.
    assert_eq!(selected, vec!["examples/package.json".to_string()]);
    assert_eq!(super::priority("examples/package.json"), 3);
}

#[test]
fn prompt_overlays_replace_snapshot_content() {
    let entries = vec![blob("src/app.ts", 10)];
    let files = vec![ContextFile {
        path: "src/app.ts".to_string(),
        content: "old content".to_string(),
    }];
    let mut overlays = HashMap::new();
    overlays.insert("src/app.ts".to_string(), "edited content".to_string());
    overlays.insert("src/new.ts".to_string(), "brand new".to_string());

    let prompt = builder().build_prompt(&entries, &files, Some("Use tabs."), &overlays);

    assert!(prompt.contains("edited content"));
    assert!(!prompt.contains("old content"));
    // Session-created files appear even when never selected.
    assert!(prompt.contains("brand new"));
    assert!(prompt.contains("<instructions>\nUse tabs.\n</instructions>"));
    assert!(prompt.contains("<repository_tree>\nsrc/app.ts\n</repository_tree>"));
}
