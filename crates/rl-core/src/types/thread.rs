use crate::types::enums::{ChangeKind, ThreadStatus};
use serde::{Deserialize, Serialize};

/// Coordinates the platform client needs to address one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    pub project: String,
    pub repository_id: String,
}

/// One PR iteration as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationInfo {
    pub id: i64,
    pub source_commit: String,
}

/// One file-level entry of an iteration's change list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// An existing comment thread on a PR, as much of it as the review core
/// reads: anchor, status and the first comment's body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentThread {
    pub thread_id: i64,
    pub path: Option<String>,
    pub line: Option<u32>,
    pub status: ThreadStatus,
    pub content: String,
}

/// A thread to be created: inline when `path`/`line` are set, PR-level
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThread {
    pub path: Option<String>,
    pub line: Option<u32>,
    pub content: String,
    pub status: ThreadStatus,
}

impl NewThread {
    pub fn inline(path: impl Into<String>, line: u32, content: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            line: Some(line),
            content: content.into(),
            status: ThreadStatus::Active,
        }
    }

    pub fn pr_level(content: impl Into<String>) -> Self {
        Self {
            path: None,
            line: None,
            content: content.into(),
            status: ThreadStatus::Active,
        }
    }
}
