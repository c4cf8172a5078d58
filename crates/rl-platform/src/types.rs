//! Wire shapes of the Azure DevOps git REST surface (api-version 7.0),
//! restricted to the fields the service reads, plus their conversions into
//! core types.

use rl_core::types::{
    ChangeKind, CommentThread, IterationChange, IterationInfo, PrSnapshot, ThreadStatus,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WireList<T> {
    pub value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRepository {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireIdentity {
    pub display_name: Option<String>,
    pub unique_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCommitRef {
    pub commit_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePullRequest {
    pub pull_request_id: i64,
    pub title: Option<String>,
    pub source_ref_name: String,
    pub target_ref_name: String,
    pub created_by: Option<WireIdentity>,
    pub last_merge_source_commit: Option<WireCommitRef>,
    pub last_merge_target_commit: Option<WireCommitRef>,
}

impl WirePullRequest {
    pub fn into_snapshot(self) -> Option<PrSnapshot> {
        let source_commit = self.last_merge_source_commit?.commit_id;
        let target_commit = self.last_merge_target_commit?.commit_id;
        let author = self
            .created_by
            .and_then(|by| by.unique_name.or(by.display_name))
            .unwrap_or_default();
        Some(PrSnapshot {
            pr_id: self.pull_request_id,
            title: self.title.unwrap_or_default(),
            author,
            source_branch: trim_ref(&self.source_ref_name),
            target_branch: trim_ref(&self.target_ref_name),
            source_commit,
            target_commit,
        })
    }
}

fn trim_ref(name: &str) -> String {
    name.trim_start_matches("refs/heads/").to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireIteration {
    pub id: i64,
    pub source_ref_commit: Option<WireCommitRef>,
}

impl WireIteration {
    pub fn into_info(self) -> IterationInfo {
        IterationInfo {
            id: self.id,
            source_commit: self
                .source_ref_commit
                .map(|commit| commit.commit_id)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireIterationChanges {
    #[serde(default)]
    pub change_entries: Vec<WireChangeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChangeEntry {
    pub item: Option<WireItem>,
    pub change_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireItem {
    pub path: Option<String>,
    #[serde(default)]
    pub is_folder: bool,
}

impl WireChangeEntry {
    pub fn into_change(self) -> Option<IterationChange> {
        let item = self.item?;
        if item.is_folder {
            return None;
        }
        let path = item.path?;
        Some(IterationChange {
            path,
            kind: parse_change_kind(self.change_type.as_deref().unwrap_or("")),
        })
    }
}

/// The platform reports composite kinds like `edit, rename`; the dominant
/// verb wins.
pub fn parse_change_kind(raw: &str) -> ChangeKind {
    let lower = raw.to_lowercase();
    if lower.contains("delete") {
        ChangeKind::Delete
    } else if lower.contains("add") {
        ChangeKind::Add
    } else if lower.contains("edit") {
        ChangeKind::Edit
    } else if lower.contains("rename") {
        ChangeKind::Rename
    } else {
        ChangeKind::Other
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePosition {
    pub line: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireThreadContext {
    pub file_path: Option<String>,
    pub right_file_start: Option<WirePosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireComment {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireThread {
    pub id: i64,
    pub status: Option<String>,
    pub thread_context: Option<WireThreadContext>,
    #[serde(default)]
    pub comments: Vec<WireComment>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl WireThread {
    pub fn into_thread(self) -> Option<CommentThread> {
        if self.is_deleted {
            return None;
        }
        let (path, line) = match self.thread_context {
            Some(context) => (
                context.file_path,
                context.right_file_start.map(|position| position.line),
            ),
            None => (None, None),
        };
        let content = self
            .comments
            .first()
            .and_then(|comment| comment.content.clone())
            .unwrap_or_default();
        Some(CommentThread {
            thread_id: self.id,
            path,
            line,
            status: parse_thread_status(self.status.as_deref().unwrap_or("")),
            content,
        })
    }
}

pub fn parse_thread_status(raw: &str) -> ThreadStatus {
    match raw.to_lowercase().as_str() {
        "active" => ThreadStatus::Active,
        "fixed" => ThreadStatus::Fixed,
        "closed" => ThreadStatus::Closed,
        "pending" => ThreadStatus::Pending,
        _ => ThreadStatus::Unknown,
    }
}

pub fn thread_status_str(status: ThreadStatus) -> &'static str {
    match status {
        ThreadStatus::Active => "active",
        ThreadStatus::Fixed => "fixed",
        ThreadStatus::Closed => "closed",
        ThreadStatus::Pending => "pending",
        ThreadStatus::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_request_deserializes_and_converts() {
        let json = r#"{
            "pullRequestId": 101,
            "title": "Add checkout",
            "sourceRefName": "refs/heads/feature/checkout",
            "targetRefName": "refs/heads/main",
            "createdBy": { "displayName": "Dev", "uniqueName": "dev@contoso.com" },
            "lastMergeSourceCommit": { "commitId": "abc123" },
            "lastMergeTargetCommit": { "commitId": "def456" }
        }"#;
        let wire: WirePullRequest = serde_json::from_str(json).unwrap();
        let snapshot = wire.into_snapshot().unwrap();
        assert_eq!(snapshot.pr_id, 101);
        assert_eq!(snapshot.source_branch, "feature/checkout");
        assert_eq!(snapshot.author, "dev@contoso.com");
    }

    #[test]
    fn change_entry_skips_folders() {
        let json = r#"{
            "changeEntries": [
                { "item": { "path": "/src", "isFolder": true }, "changeType": "add" },
                { "item": { "path": "/src/Main.java" }, "changeType": "edit, rename" }
            ]
        }"#;
        let wire: WireIterationChanges = serde_json::from_str(json).unwrap();
        let changes: Vec<_> = wire
            .change_entries
            .into_iter()
            .filter_map(WireChangeEntry::into_change)
            .collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "/src/Main.java");
        assert_eq!(changes[0].kind, ChangeKind::Edit);
    }

    #[test]
    fn change_kind_parsing() {
        assert_eq!(parse_change_kind("add"), ChangeKind::Add);
        assert_eq!(parse_change_kind("edit, delete"), ChangeKind::Delete);
        assert_eq!(parse_change_kind("rename"), ChangeKind::Rename);
        assert_eq!(parse_change_kind("sourceRename"), ChangeKind::Rename);
        assert_eq!(parse_change_kind(""), ChangeKind::Other);
    }

    #[test]
    fn thread_conversion_reads_anchor_and_first_comment() {
        let json = r#"{
            "id": 42,
            "status": "active",
            "threadContext": {
                "filePath": "/src/Main.java",
                "rightFileStart": { "line": 10, "offset": 1 }
            },
            "comments": [ { "content": "first" }, { "content": "second" } ]
        }"#;
        let wire: WireThread = serde_json::from_str(json).unwrap();
        let thread = wire.into_thread().unwrap();
        assert_eq!(thread.thread_id, 42);
        assert_eq!(thread.path.as_deref(), Some("/src/Main.java"));
        assert_eq!(thread.line, Some(10));
        assert_eq!(thread.status, ThreadStatus::Active);
        assert_eq!(thread.content, "first");
    }

    #[test]
    fn deleted_threads_are_dropped() {
        let json = r#"{ "id": 42, "isDeleted": true, "comments": [] }"#;
        let wire: WireThread = serde_json::from_str(json).unwrap();
        assert!(wire.into_thread().is_none());
    }
}
