// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`SourceHost`] seam and its in-process fake.

use crate::error::SourceHostError;
use crate::types::{Branch, CommitFile, PullRequest, Repo, Token, TreeEntry};
use async_trait::async_trait;

/// Minimal source-host contract: clone support, commits, pull requests,
/// token refresh. Everything else the product does with the source host is
/// out of scope here.
#[async_trait]
pub trait SourceHost: Send + Sync + 'static {
    async fn list_repos(&self, token: &str) -> Result<Vec<Repo>, SourceHostError>;

    async fn get_repo(&self, token: &str, slug: &str) -> Result<Repo, SourceHostError>;

    /// `Ok(None)` when the branch does not exist.
    async fn get_branch(
        &self,
        token: &str,
        slug: &str,
        branch: &str,
    ) -> Result<Option<Branch>, SourceHostError>;

    async fn get_tree(
        &self,
        token: &str,
        slug: &str,
        git_ref: &str,
    ) -> Result<Vec<TreeEntry>, SourceHostError>;

    async fn get_file(
        &self,
        token: &str,
        slug: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>, SourceHostError>;

    async fn create_branch(
        &self,
        token: &str,
        slug: &str,
        name: &str,
        from_sha: &str,
    ) -> Result<Branch, SourceHostError>;

    /// Create blobs, a tree, and a commit on `branch`, then fast-forward the
    /// ref. Returns the new commit sha.
    async fn commit_files(
        &self,
        token: &str,
        slug: &str,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<String, SourceHostError>;

    /// Open a PR from `head` to `base`, or return the already-open one.
    async fn open_or_reuse_pull_request(
        &self,
        token: &str,
        slug: &str,
        head: &str,
        base: &str,
        title: &str,
    ) -> Result<PullRequest, SourceHostError>;

    async fn merge_pull_request(
        &self,
        token: &str,
        slug: &str,
        number: u64,
    ) -> Result<(), SourceHostError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token, SourceHostError>;
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSourceHost;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct RecordedCommit {
        pub slug: String,
        pub branch: String,
        pub message: String,
        pub files: Vec<CommitFile>,
    }

    #[derive(Default)]
    struct FakeState {
        repos: HashMap<String, Repo>,
        branches: HashMap<String, Vec<Branch>>, // slug → branches
        files: HashMap<String, String>,         // "slug#ref#path" → content
        trees: HashMap<String, Vec<TreeEntry>>, // "slug#ref" → entries
        commits: Vec<RecordedCommit>,
        prs: HashMap<String, Vec<PullRequest>>, // slug → prs
        next_pr: u64,
        refresh_fails: bool,
        commit_seq: u64,
    }

    /// In-process source host with scriptable repos/branches/files.
    #[derive(Clone, Default)]
    pub struct FakeSourceHost {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeSourceHost {
        pub fn new() -> Self {
            let fake = Self::default();
            fake.add_repo("acme/widgets", "main");
            fake
        }

        pub fn add_repo(&self, slug: &str, default_branch: &str) {
            let mut state = self.state.lock();
            let next_id = state.repos.len() + 1;
            state.repos.insert(
                slug.to_string(),
                Repo {
                    id: format!("repo-{next_id}"),
                    full_name: slug.to_string(),
                    default_branch: default_branch.to_string(),
                    private: false,
                },
            );
            state
                .branches
                .entry(slug.to_string())
                .or_default()
                .push(Branch { name: default_branch.to_string(), sha: "sha-base".to_string() });
        }

        pub fn add_branch(&self, slug: &str, branch: &str) {
            self.state.lock().branches.entry(slug.to_string()).or_default().push(Branch {
                name: branch.to_string(),
                sha: "sha-base".to_string(),
            });
        }

        pub fn add_file(&self, slug: &str, git_ref: &str, path: &str, content: &str) {
            let mut state = self.state.lock();
            state
                .files
                .insert(format!("{slug}#{git_ref}#{path}"), content.to_string());
            let entry = TreeEntry {
                path: path.to_string(),
                kind: "blob".to_string(),
                size: content.len() as u64,
            };
            let tree = state.trees.entry(format!("{slug}#{git_ref}")).or_default();
            if !tree.iter().any(|e| e.path == entry.path) {
                tree.push(entry);
            }
        }

        pub fn fail_refresh(&self) {
            self.state.lock().refresh_fails = true;
        }

        pub fn commits(&self) -> Vec<RecordedCommit> {
            self.state.lock().commits.clone()
        }

        pub fn open_prs(&self, slug: &str) -> Vec<PullRequest> {
            self.state
                .lock()
                .prs
                .get(slug)
                .map(|prs| prs.iter().filter(|p| p.is_open()).cloned().collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SourceHost for FakeSourceHost {
        async fn list_repos(&self, _token: &str) -> Result<Vec<Repo>, SourceHostError> {
            Ok(self.state.lock().repos.values().cloned().collect())
        }

        async fn get_repo(&self, _token: &str, slug: &str) -> Result<Repo, SourceHostError> {
            self.state
                .lock()
                .repos
                .get(slug)
                .cloned()
                .ok_or_else(|| SourceHostError::NotFound(slug.to_string()))
        }

        async fn get_branch(
            &self,
            _token: &str,
            slug: &str,
            branch: &str,
        ) -> Result<Option<Branch>, SourceHostError> {
            Ok(self
                .state
                .lock()
                .branches
                .get(slug)
                .and_then(|b| b.iter().find(|x| x.name == branch).cloned()))
        }

        async fn get_tree(
            &self,
            _token: &str,
            slug: &str,
            git_ref: &str,
        ) -> Result<Vec<TreeEntry>, SourceHostError> {
            Ok(self
                .state
                .lock()
                .trees
                .get(&format!("{slug}#{git_ref}"))
                .cloned()
                .unwrap_or_default())
        }

        async fn get_file(
            &self,
            _token: &str,
            slug: &str,
            git_ref: &str,
            path: &str,
        ) -> Result<Option<String>, SourceHostError> {
            Ok(self.state.lock().files.get(&format!("{slug}#{git_ref}#{path}")).cloned())
        }

        async fn create_branch(
            &self,
            _token: &str,
            slug: &str,
            name: &str,
            from_sha: &str,
        ) -> Result<Branch, SourceHostError> {
            let branch = Branch { name: name.to_string(), sha: from_sha.to_string() };
            self.state
                .lock()
                .branches
                .entry(slug.to_string())
                .or_default()
                .push(branch.clone());
            Ok(branch)
        }

        async fn commit_files(
            &self,
            _token: &str,
            slug: &str,
            branch: &str,
            message: &str,
            files: &[CommitFile],
        ) -> Result<String, SourceHostError> {
            let mut state = self.state.lock();
            state.commit_seq += 1;
            let sha = format!("sha-{}", state.commit_seq);
            state.commits.push(RecordedCommit {
                slug: slug.to_string(),
                branch: branch.to_string(),
                message: message.to_string(),
                files: files.to_vec(),
            });
            if let Some(b) =
                state.branches.get_mut(slug).and_then(|b| b.iter_mut().find(|x| x.name == branch))
            {
                b.sha = sha.clone();
            }
            Ok(sha)
        }

        async fn open_or_reuse_pull_request(
            &self,
            _token: &str,
            slug: &str,
            head: &str,
            base: &str,
            title: &str,
        ) -> Result<PullRequest, SourceHostError> {
            let mut state = self.state.lock();
            if let Some(existing) = state
                .prs
                .get(slug)
                .and_then(|prs| prs.iter().find(|p| p.head == head && p.is_open()).cloned())
            {
                return Ok(existing);
            }
            state.next_pr += 1;
            let pr = PullRequest {
                number: state.next_pr,
                head: head.to_string(),
                base: base.to_string(),
                state: "open".to_string(),
                title: title.to_string(),
            };
            state.prs.entry(slug.to_string()).or_default().push(pr.clone());
            Ok(pr)
        }

        async fn merge_pull_request(
            &self,
            _token: &str,
            slug: &str,
            number: u64,
        ) -> Result<(), SourceHostError> {
            let mut state = self.state.lock();
            let pr = state
                .prs
                .get_mut(slug)
                .and_then(|prs| prs.iter_mut().find(|p| p.number == number))
                .ok_or_else(|| SourceHostError::NotFound(format!("pull request {number}")))?;
            pr.state = "merged".to_string();
            Ok(())
        }

        async fn refresh_token(&self, refresh_token: &str) -> Result<Token, SourceHostError> {
            if self.state.lock().refresh_fails {
                return Err(SourceHostError::ReconnectRequired);
            }
            Ok(Token {
                access_token: format!("access-after-{refresh_token}"),
                refresh_token: refresh_token.to_string(),
                expires_at_ms: u64::MAX,
            })
        }
    }
}
