// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use similar_asserts::assert_eq;

#[test]
fn parses_all_block_kinds_in_order() {
    let text = concat!(
        "<explanation>\nI'll fix the type error.\n</explanation>\n",
        "<file path=\"src/new.ts\">\nexport const x = 1;\n</file>\n",
        "<edit path=\"src/app.ts\">\n",
        "<<<<<<< SEARCH\nlet x: string = 1;\n=======\nlet x: number = 1;\n>>>>>>> REPLACE\n",
        "</edit>\n",
        "<bash>\ntsc --noEmit\n</bash>",
    );

    let blocks = parse_blocks(text);
    assert_eq!(blocks.len(), 4);
    assert_eq!(blocks[0], Block::Explanation("I'll fix the type error.".to_string()));
    assert_eq!(
        blocks[1],
        Block::File { path: "src/new.ts".to_string(), content: "export const x = 1;".to_string() }
    );
    assert_eq!(
        blocks[2],
        Block::Edit {
            path: "src/app.ts".to_string(),
            edits: vec![SearchReplace {
                search: "let x: string = 1;".to_string(),
                replace: "let x: number = 1;".to_string(),
            }],
        }
    );
    assert_eq!(blocks[3], Block::Bash("tsc --noEmit".to_string()));
}

#[test]
fn multiple_search_replace_pairs_in_one_edit() {
    let text = concat!(
        "<edit path=\"a.rs\">\n",
        "<<<<<<< SEARCH\nfoo\n=======\nbar\n>>>>>>> REPLACE\n",
        "<<<<<<< SEARCH\nbaz\n=======\nqux\n>>>>>>> REPLACE\n",
        "</edit>",
    );
    let blocks = parse_blocks(text);
    let Block::Edit { edits, .. } = &blocks[0] else { panic!("expected edit") };
    assert_eq!(edits.len(), 2);
    assert_eq!(edits[1].search, "baz");
    assert_eq!(edits[1].replace, "qux");
}

#[test]
fn reparsing_yields_the_same_blocks() {
    let text = concat!(
        "prose before\n",
        "<edit path=\"a.rs\">\n",
        "<<<<<<< SEARCH\n  indented\n=======\n  replaced\n>>>>>>> REPLACE\n",
        "</edit>\nprose after",
    );
    assert_eq!(parse_blocks(text), parse_blocks(text));
}

#[test]
fn whitespace_in_search_replace_is_preserved_exactly() {
    let text = concat!(
        "<edit path=\"a.py\">\n",
        "<<<<<<< SEARCH\n    def f():\n        return  1\n=======\n    def f():\n        return 2\n>>>>>>> REPLACE\n",
        "</edit>",
    );
    let blocks = parse_blocks(text);
    let Block::Edit { edits, .. } = &blocks[0] else { panic!("expected edit") };
    assert_eq!(edits[0].search, "    def f():\n        return  1");
    assert_eq!(edits[0].replace, "    def f():\n        return 2");
}

#[test]
fn unclosed_tags_are_treated_as_prose() {
    let blocks = parse_blocks("<bash>\necho hi\n<explanation>fine</explanation>");
    // The unclosed bash swallows nothing; the explanation still parses.
    assert_eq!(blocks, vec![Block::Explanation("fine".to_string())]);
}

#[test]
fn incomplete_trailing_pair_is_dropped() {
    let text = concat!(
        "<edit path=\"a.rs\">\n",
        "<<<<<<< SEARCH\nfoo\n=======\nbar\n>>>>>>> REPLACE\n",
        "<<<<<<< SEARCH\ndangling\n",
        "</edit>",
    );
    let blocks = parse_blocks(text);
    let Block::Edit { edits, .. } = &blocks[0] else { panic!("expected edit") };
    assert_eq!(edits.len(), 1);
}

#[test]
fn tag_names_do_not_prefix_match() {
    let blocks = parse_blocks("<editor path=\"x\">stuff</editor>");
    assert!(blocks.is_empty());
}

#[test]
fn file_without_path_is_skipped() {
    let blocks = parse_blocks("<file>\ncontent\n</file>");
    assert!(blocks.is_empty());
}

// ── apply_edits ─────────────────────────────────────────────────────────

#[test]
fn applies_edits_in_order() {
    let content = "fn a() {}\nfn b() {}\n";
    let edits = vec![
        SearchReplace { search: "fn a() {}".to_string(), replace: "fn a() -> u32 { 1 }".to_string() },
        SearchReplace { search: "fn b() {}".to_string(), replace: "fn b() -> u32 { 2 }".to_string() },
    ];

    let outcome = apply_edits(content, &edits);
    assert_eq!(outcome.content, "fn a() -> u32 { 1 }\nfn b() -> u32 { 2 }\n");
    assert_eq!(outcome.applied, 2);
    assert_eq!(outcome.failed, 0);
}

#[test]
fn missed_search_is_skipped_not_fatal() {
    let outcome = apply_edits(
        "hello",
        &[
            SearchReplace { search: "nope".to_string(), replace: "x".to_string() },
            SearchReplace { search: "hello".to_string(), replace: "goodbye".to_string() },
        ],
    );
    assert_eq!(outcome.content, "goodbye");
    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.failed, 1);
}

#[test]
fn empty_edit_list_is_identity() {
    let content = "unchanged\r\ncontent with\ttabs  ";
    let outcome = apply_edits(content, &[]);
    assert_eq!(outcome.content, content);
}

#[test]
fn only_first_occurrence_is_replaced() {
    let outcome = apply_edits(
        "dup dup",
        &[SearchReplace { search: "dup".to_string(), replace: "one".to_string() }],
    );
    assert_eq!(outcome.content, "one dup");
}

#[test]
fn crlf_endings_are_not_normalized() {
    let content = "line1\r\nline2\r\n";
    let outcome = apply_edits(
        content,
        &[SearchReplace { search: "line1\r\n".to_string(), replace: "first\r\n".to_string() }],
    );
    assert_eq!(outcome.content, "first\r\nline2\r\n");
}

#[test]
fn later_edits_see_earlier_results() {
    let outcome = apply_edits(
        "start",
        &[
            SearchReplace { search: "start".to_string(), replace: "middle".to_string() },
            SearchReplace { search: "middle".to_string(), replace: "end".to_string() },
        ],
    );
    assert_eq!(outcome.content, "end");
    assert_eq!(outcome.applied, 2);
}
