// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository context for the system prompt.
//!
//! The model sees the filtered file tree plus a bounded selection of file
//! contents biased toward project-root configuration and source
//! entrypoints. Prior session edits are overlaid on top of the snapshot so
//! the model always sees its own most recent work, never stale disk.

use glob::Pattern;
use sb_githost::TreeEntry;
use std::collections::HashMap;

/// Paths excluded from the tree and from selection.
pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    ".git/**",
    "node_modules/**",
    "dist/**",
    "build/**",
    "target/**",
    "vendor/**",
    ".next/**",
    "coverage/**",
    "*.lock",
    "package-lock.json",
    "*.min.js",
    "*.map",
    "*.png",
    "*.jpg",
    "*.gif",
    "*.ico",
    "*.woff",
    "*.woff2",
];

/// Root files always included, even past the file cap.
const MUST_INCLUDE: &[&str] = &[
    "AGENTS.md",
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
];

/// Root config files preferred when budget remains.
const ROOT_CONFIG: &[&str] = &[
    "README.md",
    "tsconfig.json",
    "vite.config.ts",
    "next.config.js",
    "webpack.config.js",
    "Makefile",
    "docker-compose.yml",
    "Dockerfile",
    ".env.example",
];

/// Entrypoint basenames preferred after root config.
const ENTRYPOINTS: &[&str] = &[
    "main.ts", "main.tsx", "main.js", "main.py", "main.rs", "main.go",
    "index.ts", "index.tsx", "index.js", "app.ts", "app.tsx", "app.py",
    "lib.rs", "mod.rs",
];

/// One file included in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

/// Tree filtering and context-file selection under the configured caps.
pub struct ContextBuilder {
    file_cap: usize,
    byte_cap: usize,
    max_file_bytes: usize,
    skip: Vec<Pattern>,
}

impl ContextBuilder {
    pub fn new(file_cap: usize, byte_cap: usize, max_file_bytes: usize) -> Self {
        let skip = DEFAULT_SKIP_PATTERNS
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        Self { file_cap, byte_cap, max_file_bytes, skip }
    }

    pub fn from_config(config: &sb_core::config::AgentConfig) -> Self {
        Self::new(
            config.context_file_cap,
            config.context_byte_cap,
            config.context_max_file_bytes,
        )
    }

    fn skipped(&self, path: &str) -> bool {
        self.skip.iter().any(|p| p.matches(path))
    }

    /// Files surviving the skip patterns and the per-file size cap,
    /// lexicographically sorted.
    pub fn filter_tree<'a>(&self, entries: &'a [TreeEntry]) -> Vec<&'a TreeEntry> {
        let mut files: Vec<&TreeEntry> = entries
            .iter()
            .filter(|e| e.is_file())
            .filter(|e| !self.skipped(&e.path))
            .filter(|e| e.size as usize <= self.max_file_bytes)
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Pick the context-file paths. Must-include files take precedence over
    /// both caps; everything else competes for the remaining budget by
    /// priority, then shallowness, then path order.
    pub fn select_paths(&self, entries: &[TreeEntry]) -> Vec<String> {
        let mut candidates = self.filter_tree(entries);
        candidates.sort_by_key(|e| (priority(&e.path), depth(&e.path), e.path.clone()));

        let mut selected = Vec::new();
        let mut bytes = 0usize;
        for entry in candidates {
            let must = priority(&entry.path) == 0;
            if must {
                selected.push(entry.path.clone());
                bytes += entry.size as usize;
                continue;
            }
            if selected.len() >= self.file_cap {
                continue;
            }
            if bytes + entry.size as usize > self.byte_cap {
                continue;
            }
            bytes += entry.size as usize;
            selected.push(entry.path.clone());
        }
        selected
    }

    /// Render the filtered tree as an indented listing for the prompt.
    pub fn render_tree(&self, entries: &[TreeEntry]) -> String {
        self.filter_tree(entries)
            .iter()
            .map(|e| e.path.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Assemble the system prompt. `overlays` replaces file contents with the
    /// session's own edits.
    pub fn build_prompt(
        &self,
        tree: &[TreeEntry],
        files: &[ContextFile],
        instructions: Option<&str>,
        overlays: &HashMap<String, String>,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "You are a coding agent working inside a sandboxed checkout of the \
             user's repository.\n\n\
             Respond with any of these blocks:\n\
             <explanation>…</explanation> — a short summary of what you did\n\
             <file path=\"…\">…</file> — a complete file replacement\n\
             <edit path=\"…\"> with SEARCH/REPLACE pairs — a targeted edit\n\
             <bash>…</bash> — a shell command to run in the sandbox\n\n\
             Edits apply as exact substring matches; copy the current file \
             content precisely. Command output comes back in the next user \
             turn.\n",
        );

        if let Some(instructions) = instructions {
            prompt.push_str("\n<instructions>\n");
            prompt.push_str(instructions.trim());
            prompt.push_str("\n</instructions>\n");
        }

        prompt.push_str("\n<repository_tree>\n");
        prompt.push_str(&self.render_tree(tree));
        prompt.push_str("\n</repository_tree>\n");

        for file in files {
            let content = overlays.get(&file.path).unwrap_or(&file.content);
            prompt.push_str(&format!("\n<file path=\"{}\">\n{}\n</file>\n", file.path, content));
        }
        // Files the session created or edited that were not selected still
        // appear — the model must see its own latest work.
        for (path, content) in sorted(overlays) {
            if !files.iter().any(|f| f.path == *path) {
                prompt.push_str(&format!("\n<file path=\"{path}\">\n{content}\n</file>\n"));
            }
        }

        prompt
    }
}

fn sorted(map: &HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(k, _)| k.as_str());
    entries
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Lower sorts earlier. 0 = must-include, 1 = root config, 2 = entrypoint,
/// 3 = everything else.
fn priority(path: &str) -> u8 {
    if !path.contains('/') && MUST_INCLUDE.contains(&path) {
        return 0;
    }
    if !path.contains('/') && ROOT_CONFIG.contains(&path) {
        return 1;
    }
    let basename = path.rsplit('/').next().unwrap_or(path);
    if ENTRYPOINTS.contains(&basename) {
        return 2;
    }
    3
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
