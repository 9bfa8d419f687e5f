// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn short_output_is_untouched() {
    assert_eq!(truncate_middle("short", 100), "short");
}

#[test]
fn long_output_keeps_head_and_tail() {
    let s = format!("{}MIDDLE{}", "a".repeat(100), "b".repeat(100));
    let out = truncate_middle(&s, 40);

    assert!(out.starts_with(&"a".repeat(20)));
    assert!(out.ends_with(&"b".repeat(20)));
    assert!(out.contains("bytes elided"));
    assert!(!out.contains("MIDDLE"));
}

#[test]
fn exact_limit_is_untouched() {
    let s = "x".repeat(64);
    assert_eq!(truncate_middle(&s, 64), s);
}

#[test]
fn multibyte_content_splits_on_char_boundaries() {
    let s = "é".repeat(100); // 2 bytes per char
    let out = truncate_middle(&s, 21); // lands mid-char without the fixup
    assert!(out.contains("bytes elided"));
    // The kept halves split on char boundaries, not mid-codepoint.
    assert_eq!(out.chars().next(), Some('é'));
    assert_eq!(out.chars().last(), Some('é'));
}
