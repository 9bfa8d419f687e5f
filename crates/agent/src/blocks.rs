// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured blocks parsed out of a model response, and edit application.
//!
//! The response grammar is four tags: `<explanation>`, `<file path="…">`,
//! `<edit path="…">` (holding SEARCH/REPLACE pairs), and `<bash>`. Parsing is
//! deterministic and total — malformed fragments are skipped, never fatal.
//!
//! Edit application is exact-substring search/replace. Whitespace is
//! preserved byte for byte and line endings are never normalized; a search
//! string that does not match is skipped and counted, not an error.

/// One SEARCH/REPLACE pair from an `<edit>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReplace {
    pub search: String,
    pub replace: String,
}

/// A parsed response block, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Explanation(String),
    /// Complete file replacement
    File { path: String, content: String },
    /// Exact-substring edits against the current known content
    Edit { path: String, edits: Vec<SearchReplace> },
    Bash(String),
}

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER_MARKER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

/// Parse a complete model response into blocks.
///
/// Re-parsing the same text yields the same list. Unclosed or unrecognized
/// tags are treated as prose and ignored.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open_at) = rest.find('<') {
        let candidate = &rest[open_at..];
        let parsed = parse_tag(candidate, "explanation", |body, _| {
            Some(Block::Explanation(body.trim().to_string()))
        })
        .or_else(|| {
            parse_tag(candidate, "file", |body, path| {
                Some(Block::File { path: path?, content: strip_block_newlines(body).to_string() })
            })
        })
        .or_else(|| {
            parse_tag(candidate, "edit", |body, path| {
                Some(Block::Edit { path: path?, edits: parse_search_replace(body) })
            })
        })
        .or_else(|| {
            parse_tag(candidate, "bash", |body, _| {
                Some(Block::Bash(strip_block_newlines(body).to_string()))
            })
        });

        match parsed {
            Some((block, consumed)) => {
                blocks.push(block);
                rest = &candidate[consumed..];
            }
            None => {
                rest = &rest[open_at + 1..];
            }
        }
    }

    blocks
}

/// Try to parse one `<tag …>body</tag>` at the start of `text`.
/// Returns the block and the number of bytes consumed.
fn parse_tag(
    text: &str,
    tag: &str,
    build: impl FnOnce(&str, Option<String>) -> Option<Block>,
) -> Option<(Block, usize)> {
    let open_prefix = format!("<{tag}");
    if !text.starts_with(&open_prefix) {
        return None;
    }
    let after_name = &text[open_prefix.len()..];
    // The tag name must end here: `<edit>` must not match `<editor>`.
    let next = after_name.chars().next()?;
    if next != '>' && !next.is_whitespace() {
        return None;
    }

    let open_end = text.find('>')?;
    let attrs = &text[open_prefix.len()..open_end];
    let path = parse_path_attr(attrs);

    let close = format!("</{tag}>");
    let body_start = open_end + 1;
    let close_at = text[body_start..].find(&close)?;
    let body = &text[body_start..body_start + close_at];

    let block = build(body, path)?;
    Some((block, body_start + close_at + close.len()))
}

/// Extract `path="…"` from a tag's attribute text.
fn parse_path_attr(attrs: &str) -> Option<String> {
    let at = attrs.find("path=\"")?;
    let rest = &attrs[at + 6..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// File and bash bodies drop exactly one leading and one trailing newline:
/// the ones introduced by the tag layout, not part of the content.
fn strip_block_newlines(body: &str) -> &str {
    let body = body.strip_prefix('\n').unwrap_or(body);
    body.strip_suffix('\n').unwrap_or(body)
}

/// Parse SEARCH/REPLACE pairs from an `<edit>` body. Incomplete trailing
/// pairs are dropped.
fn parse_search_replace(body: &str) -> Vec<SearchReplace> {
    let mut pairs = Vec::new();
    let mut lines = body.split('\n').peekable();

    while lines.peek().is_some() {
        // Seek the next SEARCH marker.
        let mut found = false;
        for line in lines.by_ref() {
            if line.trim_end() == SEARCH_MARKER {
                found = true;
                break;
            }
        }
        if !found {
            break;
        }

        let mut search_lines = Vec::new();
        let mut divided = false;
        for line in lines.by_ref() {
            if line.trim_end() == DIVIDER_MARKER {
                divided = true;
                break;
            }
            search_lines.push(line);
        }
        if !divided {
            break;
        }

        let mut replace_lines = Vec::new();
        let mut closed = false;
        for line in lines.by_ref() {
            if line.trim_end() == REPLACE_MARKER {
                closed = true;
                break;
            }
            replace_lines.push(line);
        }
        if !closed {
            break;
        }

        pairs.push(SearchReplace {
            search: search_lines.join("\n"),
            replace: replace_lines.join("\n"),
        });
    }

    pairs
}

/// Result of applying a list of edits to one file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub content: String,
    pub applied: usize,
    /// Search strings that matched nothing; skipped, never fatal
    pub failed: usize,
}

/// Apply edits in order. Each search matches the first occurrence in the
/// current content; a miss skips that edit.
pub fn apply_edits(content: &str, edits: &[SearchReplace]) -> ApplyOutcome {
    let mut current = content.to_string();
    let mut applied = 0;
    let mut failed = 0;

    for edit in edits {
        if current.contains(&edit.search) {
            current = current.replacen(&edit.search, &edit.replace, 1);
            applied += 1;
        } else {
            tracing::warn!(
                search_len = edit.search.len(),
                "edit search string not found, skipping"
            );
            failed += 1;
        }
    }

    ApplyOutcome { content: current, applied, failed }
}

#[cfg(test)]
#[path = "blocks_tests.rs"]
mod tests;
