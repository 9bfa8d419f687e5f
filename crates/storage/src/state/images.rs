// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repo image and checkpoint event handlers.
//!
//! Both artifacts are discovered from host callbacks, never created here.
//! Discovery replaces any previous artifact under the same key — the host's
//! latest report wins.

use sb_core::{Checkpoint, Event, RepoImage};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::RepoImageDiscovered {
            repo_id,
            branch,
            tag,
            size_bytes,
            commit_sha,
            status,
            at_ms,
        } => {
            let key = RepoImage::key(repo_id, branch);
            let use_count = state.repo_images.get(&key).map(|i| i.use_count).unwrap_or(0);
            state.repo_images.insert(
                key,
                RepoImage {
                    repo_id: repo_id.clone(),
                    branch: branch.clone(),
                    tag: tag.clone(),
                    size_bytes: *size_bytes,
                    commit_sha: commit_sha.clone(),
                    status: *status,
                    use_count,
                    last_used_at_ms: *at_ms,
                },
            );
        }

        Event::RepoImageUsed { repo_id, branch, at_ms } => {
            let key = RepoImage::key(repo_id, branch);
            if let Some(image) = state.repo_images.get_mut(&key) {
                image.use_count = image.use_count.saturating_add(1);
                image.last_used_at_ms = (*at_ms).max(image.last_used_at_ms);
            }
        }

        Event::CheckpointDiscovered { repo_id, branch, name, size_bytes, commit_sha, at_ms } => {
            let key = RepoImage::key(repo_id, branch);
            let use_count = state.checkpoints.get(&key).map(|c| c.use_count).unwrap_or(0);
            state.checkpoints.insert(
                key,
                Checkpoint {
                    repo_id: repo_id.clone(),
                    branch: branch.clone(),
                    name: name.clone(),
                    size_bytes: *size_bytes,
                    commit_sha: commit_sha.clone(),
                    use_count,
                    last_used_at_ms: *at_ms,
                },
            );
        }

        _ => {}
    }
}
