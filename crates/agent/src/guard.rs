// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deny-list for agent shell commands.
//!
//! File modifications must go through edit blocks so they are recorded and
//! diffable; shell builtins that write files in place are refused. The
//! refusal is fed back to the model in-conversation with exit code 1 so it
//! can recover on its own.

/// Fixed refusal string reported back to the model.
pub const REFUSAL: &str =
    "Command blocked: modify files with edit blocks instead of shell redirection or in-place tools.";

/// Programs denied outright, wherever they appear in a pipeline.
const DENIED_PROGRAMS: &[&str] = &["dd", "awk", "tee"];

/// Programs denied only when their segment redirects to a file.
const REDIRECT_PROGRAMS: &[&str] = &["printf", "echo", "cat"];

/// Returns the reason a command is denied, or `None` when it may run.
pub fn denied_reason(command: &str) -> Option<String> {
    for segment in split_segments(command) {
        let Some(program) = segment_program(segment) else {
            continue;
        };

        if DENIED_PROGRAMS.contains(&program) {
            return Some(format!("in-place file write via `{program}`"));
        }
        if program == "sed" && segment_has_flag(segment, "-i") {
            return Some("in-place file write via `sed -i`".to_string());
        }
        if REDIRECT_PROGRAMS.contains(&program) && segment_redirects(segment) {
            return Some(format!("file write via `{program}` redirection"));
        }
    }
    None
}

/// Split a command line on `;`, `&&`, `||`, and `|` so each simple command
/// is inspected on its own.
fn split_segments(command: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let bytes = command.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let split_len = match bytes[i] {
            b';' => 1,
            b'&' if bytes.get(i + 1) == Some(&b'&') => 2,
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    2
                } else {
                    1
                }
            }
            _ => 0,
        };
        if split_len > 0 {
            segments.push(&command[start..i]);
            i += split_len;
            start = i;
        } else {
            i += 1;
        }
    }
    segments.push(&command[start..]);
    segments
}

/// The program word of a segment: first token that is not an env assignment
/// or wrapper prefix, with any directory path stripped.
fn segment_program(segment: &str) -> Option<&str> {
    for token in segment.split_whitespace() {
        if token.contains('=') {
            continue; // env assignment prefix
        }
        if matches!(token, "sudo" | "command" | "nohup" | "time" | "xargs") {
            continue;
        }
        return Some(token.rsplit('/').next().unwrap_or(token));
    }
    None
}

fn segment_has_flag(segment: &str, flag: &str) -> bool {
    segment
        .split_whitespace()
        .any(|t| t == flag || (t.starts_with(flag) && flag.starts_with('-')))
}

/// Whether a segment redirects stdout to a file (`>` or `>>`).
/// `2>&1` and fd duplication are not file writes.
fn segment_redirects(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'>' {
            // Skip fd duplications like `>&2`.
            if bytes.get(i + 1) == Some(&b'&') {
                i += 2;
                continue;
            }
            return true;
        }
        i += 1;
    }
    false
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
