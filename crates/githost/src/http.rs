// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP implementation of [`SourceHost`] against a GitHub-style API.

use crate::client::SourceHost;
use crate::error::SourceHostError;
use crate::types::{Branch, CommitFile, PullRequest, Repo, Token, TreeEntry};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpSourceHost {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSourceHost {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("sandbar")
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
    ) -> Result<T, SourceHostError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, SourceHostError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }

    async fn patch_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, SourceHostError> {
        let response = self
            .client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }
}

fn network(e: reqwest::Error) -> SourceHostError {
    SourceHostError::Network(e.to_string())
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SourceHostError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(network)?;
    if !(200..300).contains(&status) {
        return Err(SourceHostError::from_status(status, &body));
    }
    serde_json::from_str(&body).map_err(|e| SourceHostError::Api {
        status,
        message: format!("malformed response: {e}"),
    })
}

#[derive(Deserialize)]
struct ApiRepo {
    id: u64,
    full_name: String,
    default_branch: String,
    #[serde(default)]
    private: bool,
}

impl From<ApiRepo> for Repo {
    fn from(r: ApiRepo) -> Self {
        Repo {
            id: r.id.to_string(),
            full_name: r.full_name,
            default_branch: r.default_branch,
            private: r.private,
        }
    }
}

#[derive(Deserialize)]
struct ApiBranch {
    name: String,
    commit: ApiSha,
}

#[derive(Deserialize)]
struct ApiSha {
    sha: String,
}

#[derive(Deserialize)]
struct ApiTree {
    tree: Vec<TreeEntry>,
}

#[derive(Deserialize)]
struct ApiCommit {
    sha: String,
    tree: ApiSha,
}

#[derive(Deserialize)]
struct ApiPull {
    number: u64,
    state: String,
    title: String,
    head: ApiRefName,
    base: ApiRefName,
}

#[derive(Deserialize)]
struct ApiRefName {
    #[serde(rename = "ref")]
    name: String,
}

impl From<ApiPull> for PullRequest {
    fn from(p: ApiPull) -> Self {
        PullRequest {
            number: p.number,
            head: p.head.name,
            base: p.base.name,
            state: p.state,
            title: p.title,
        }
    }
}

#[derive(Deserialize)]
struct ApiToken {
    access_token: String,
    refresh_token: String,
    /// Seconds until expiry
    expires_in: u64,
}

#[async_trait]
impl SourceHost for HttpSourceHost {
    async fn list_repos(&self, token: &str) -> Result<Vec<Repo>, SourceHostError> {
        let repos: Vec<ApiRepo> = self.get_json(token, "/user/repos?per_page=100").await?;
        Ok(repos.into_iter().map(Repo::from).collect())
    }

    async fn get_repo(&self, token: &str, slug: &str) -> Result<Repo, SourceHostError> {
        let repo: ApiRepo = self.get_json(token, &format!("/repos/{slug}")).await?;
        Ok(repo.into())
    }

    async fn get_branch(
        &self,
        token: &str,
        slug: &str,
        branch: &str,
    ) -> Result<Option<Branch>, SourceHostError> {
        match self
            .get_json::<ApiBranch>(token, &format!("/repos/{slug}/branches/{branch}"))
            .await
        {
            Ok(b) => Ok(Some(Branch { name: b.name, sha: b.commit.sha })),
            Err(SourceHostError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_tree(
        &self,
        token: &str,
        slug: &str,
        git_ref: &str,
    ) -> Result<Vec<TreeEntry>, SourceHostError> {
        let tree: ApiTree = self
            .get_json(token, &format!("/repos/{slug}/git/trees/{git_ref}?recursive=1"))
            .await?;
        Ok(tree.tree)
    }

    async fn get_file(
        &self,
        token: &str,
        slug: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<String>, SourceHostError> {
        // The raw media type skips the base64 contents envelope.
        let response = self
            .client
            .get(self.url(&format!("/repos/{slug}/contents/{path}?ref={git_ref}")))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github.raw")
            .send()
            .await
            .map_err(network)?;
        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        let body = response.text().await.map_err(network)?;
        if !(200..300).contains(&status) {
            return Err(SourceHostError::from_status(status, &body));
        }
        Ok(Some(body))
    }

    async fn create_branch(
        &self,
        token: &str,
        slug: &str,
        name: &str,
        from_sha: &str,
    ) -> Result<Branch, SourceHostError> {
        let _: serde_json::Value = self
            .post_json(
                token,
                &format!("/repos/{slug}/git/refs"),
                &json!({ "ref": format!("refs/heads/{name}"), "sha": from_sha }),
            )
            .await?;
        Ok(Branch { name: name.to_string(), sha: from_sha.to_string() })
    }

    async fn commit_files(
        &self,
        token: &str,
        slug: &str,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<String, SourceHostError> {
        let head = self
            .get_branch(token, slug, branch)
            .await?
            .ok_or_else(|| SourceHostError::NotFound(format!("branch {branch}")))?;
        let parent: ApiCommit = self
            .get_json(token, &format!("/repos/{slug}/git/commits/{}", head.sha))
            .await?;

        let mut tree_entries = Vec::with_capacity(files.len());
        for file in files {
            let blob: ApiSha = self
                .post_json(
                    token,
                    &format!("/repos/{slug}/git/blobs"),
                    &json!({ "content": file.content, "encoding": "utf-8" }),
                )
                .await?;
            tree_entries.push(json!({
                "path": file.path,
                "mode": "100644",
                "type": "blob",
                "sha": blob.sha,
            }));
        }

        let tree: ApiSha = self
            .post_json(
                token,
                &format!("/repos/{slug}/git/trees"),
                &json!({ "base_tree": parent.tree.sha, "tree": tree_entries }),
            )
            .await?;

        let commit: ApiSha = self
            .post_json(
                token,
                &format!("/repos/{slug}/git/commits"),
                &json!({ "message": message, "tree": tree.sha, "parents": [parent.sha] }),
            )
            .await?;

        let _: serde_json::Value = self
            .patch_json(
                token,
                &format!("/repos/{slug}/git/refs/heads/{branch}"),
                &json!({ "sha": commit.sha }),
            )
            .await?;

        Ok(commit.sha)
    }

    async fn open_or_reuse_pull_request(
        &self,
        token: &str,
        slug: &str,
        head: &str,
        base: &str,
        title: &str,
    ) -> Result<PullRequest, SourceHostError> {
        let owner = slug.split('/').next().unwrap_or_default();
        let open: Vec<ApiPull> = self
            .get_json(
                token,
                &format!("/repos/{slug}/pulls?state=open&head={owner}:{head}"),
            )
            .await?;
        if let Some(existing) = open.into_iter().next() {
            return Ok(existing.into());
        }

        let created: ApiPull = self
            .post_json(
                token,
                &format!("/repos/{slug}/pulls"),
                &json!({ "title": title, "head": head, "base": base }),
            )
            .await?;
        Ok(created.into())
    }

    async fn merge_pull_request(
        &self,
        token: &str,
        slug: &str,
        number: u64,
    ) -> Result<(), SourceHostError> {
        let response = self
            .client
            .put(self.url(&format!("/repos/{slug}/pulls/{number}/merge")))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await
            .map_err(network)?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceHostError::from_status(status, &body));
        }
        Ok(())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token, SourceHostError> {
        let response = self
            .client
            .post(self.url("/login/oauth/access_token"))
            .header("Accept", "application/json")
            .json(&json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await
            .map_err(network)?;
        let token: ApiToken = read_json(response).await?;
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Ok(Token {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at_ms: now_ms + token.expires_in * 1000,
        })
    }
}
