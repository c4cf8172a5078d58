//! Computes the change delta between two PR iterations, or the full change
//! list when there is no reviewed iteration to compare against.

use rl_core::types::delta::{ChangeDelta, FileSlice};
use rl_core::types::{ChangeKind, RepoHandle};
use rl_platform::{Platform, PlatformError};
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiffError {
    /// The platform no longer knows the prior iteration; the caller falls
    /// back to a full review.
    #[error("prior iteration unknown to the platform")]
    PriorIterationUnknown,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Delta of `current_iter` relative to `prior_iter`. Deletions are dropped;
/// files added since the prior iteration carry a single full range.
pub async fn diff(
    platform: &dyn Platform,
    repo: &RepoHandle,
    pr_id: i64,
    prior_iter: i64,
    current_iter: i64,
) -> Result<ChangeDelta, DiffError> {
    let iterations = platform.list_iterations(repo, pr_id).await?;
    let prior = iterations
        .iter()
        .find(|iteration| iteration.id == prior_iter)
        .ok_or(DiffError::PriorIterationUnknown)?
        .clone();
    let current = iterations
        .iter()
        .find(|iteration| iteration.id == current_iter)
        .ok_or_else(|| {
            DiffError::Platform(PlatformError::NotFound {
                what: format!("iteration {current_iter}"),
            })
        })?
        .clone();

    let prior_changes = platform.get_iteration_changes(repo, pr_id, prior_iter).await?;
    let current_changes = platform
        .get_iteration_changes(repo, pr_id, current_iter)
        .await?;
    let prior_paths: HashMap<&str, ChangeKind> = prior_changes
        .iter()
        .map(|change| (change.path.as_str(), change.kind))
        .collect();

    let mut files = Vec::new();
    for change in &current_changes {
        if change.kind == ChangeKind::Delete {
            continue;
        }
        let Some(target_content) = platform
            .get_file(repo, &change.path, &current.source_commit)
            .await?
        else {
            continue;
        };

        if !prior_paths.contains_key(change.path.as_str()) {
            files.push(FileSlice::added(change.path.clone(), target_content));
            continue;
        }

        let Some(prior_content) = platform
            .get_file(repo, &change.path, &prior.source_commit)
            .await?
        else {
            files.push(FileSlice::added(change.path.clone(), target_content));
            continue;
        };
        if prior_content == target_content {
            continue;
        }
        let changed = changed_ranges(&prior_content, &target_content);
        if changed.is_empty() {
            continue;
        }
        files.push(FileSlice::modified(
            change.path.clone(),
            changed,
            target_content,
        ));
    }

    Ok(ChangeDelta { files })
}

/// Full change list of one iteration, diffed against the PR's target branch
/// content. Used for created events and every watermark-loss fallback.
pub async fn full(
    platform: &dyn Platform,
    repo: &RepoHandle,
    pr_id: i64,
    iteration_id: i64,
    target_commit: &str,
) -> Result<ChangeDelta, DiffError> {
    let iterations = platform.list_iterations(repo, pr_id).await?;
    let current = iterations
        .iter()
        .find(|iteration| iteration.id == iteration_id)
        .ok_or_else(|| {
            DiffError::Platform(PlatformError::NotFound {
                what: format!("iteration {iteration_id}"),
            })
        })?
        .clone();
    let changes = platform
        .get_iteration_changes(repo, pr_id, iteration_id)
        .await?;

    let mut files = Vec::new();
    for change in &changes {
        if change.kind == ChangeKind::Delete {
            continue;
        }
        let Some(target_content) = platform
            .get_file(repo, &change.path, &current.source_commit)
            .await?
        else {
            continue;
        };

        match change.kind {
            ChangeKind::Add => files.push(FileSlice::added(change.path.clone(), target_content)),
            _ => {
                let base = platform.get_file(repo, &change.path, target_commit).await?;
                match base {
                    Some(base_content) if base_content != target_content => {
                        let changed = changed_ranges(&base_content, &target_content);
                        if !changed.is_empty() {
                            files.push(FileSlice::modified(
                                change.path.clone(),
                                changed,
                                target_content,
                            ));
                        }
                    }
                    Some(_) => {}
                    None => files.push(FileSlice::added(change.path.clone(), target_content)),
                }
            }
        }
    }

    Ok(ChangeDelta { files })
}

/// 1-based inclusive ranges of lines that are new or rewritten in `new`
/// relative to `old`.
pub fn changed_ranges(old: &str, new: &str) -> Vec<(u32, u32)> {
    let diff = TextDiff::from_lines(old, new);
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for change in diff.iter_all_changes() {
        if change.tag() != ChangeTag::Insert {
            continue;
        }
        let Some(index) = change.new_index() else {
            continue;
        };
        let line = index as u32 + 1;
        match ranges.last_mut() {
            Some(last) if last.1 + 1 == line => last.1 = line,
            _ => ranges.push((line, line)),
        }
    }
    ranges
}
