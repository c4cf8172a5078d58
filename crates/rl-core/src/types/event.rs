use crate::types::enums::PrEventKind;
use crate::types::ids::RepoId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Normalized pull-request event, produced by ingest and consumed exactly
/// once by an agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrEvent {
    pub kind: PrEventKind,
    pub pr_id: i64,
    pub repository_id: RepoId,
    /// Platform-side repository id, kept for the REST calls.
    pub platform_repo_id: String,
    pub source_branch: String,
    pub target_branch: String,
    pub source_commit: String,
    pub target_commit: String,
    /// Present on update events when the payload carries it.
    pub iteration_id: Option<i64>,
    pub author: String,
    pub title: String,
    pub received_at: DateTime<Utc>,
}

impl PrEvent {
    /// Key under which duplicate deliveries collapse: one review per
    /// `(pr, iteration-or-commit, kind)`.
    pub fn dedup_key(&self) -> String {
        let revision = match self.iteration_id {
            Some(iteration) => iteration.to_string(),
            None => self.source_commit.clone(),
        };
        format!("{}:{}:{:?}", self.pr_id, revision, self.kind)
    }
}

/// A leased job-queue entry. Redelivered after `visible_at` passes without
/// an ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub entry_id: i64,
    pub event: PrEvent,
    pub dedup_key: String,
    pub attempts: u32,
    pub visible_at: DateTime<Utc>,
}

/// PR metadata as fetched from the platform at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrSnapshot {
    pub pr_id: i64,
    pub title: String,
    pub author: String,
    pub source_branch: String,
    pub target_branch: String,
    pub source_commit: String,
    pub target_commit: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(iteration_id: Option<i64>, kind: PrEventKind) -> PrEvent {
        PrEvent {
            kind,
            pr_id: 101,
            repository_id: RepoId::generate(),
            platform_repo_id: "a4f0f1b2".to_string(),
            source_branch: "feature/x".to_string(),
            target_branch: "main".to_string(),
            source_commit: "abc123".to_string(),
            target_commit: "def456".to_string(),
            iteration_id,
            author: "dev@contoso.com".to_string(),
            title: "Add checkout".to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn dedup_key_prefers_iteration() {
        assert_eq!(
            event(Some(2), PrEventKind::Updated).dedup_key(),
            "101:2:Updated"
        );
        assert_eq!(
            event(None, PrEventKind::Created).dedup_key(),
            "101:abc123:Created"
        );
    }

    #[test]
    fn dedup_key_distinguishes_kinds() {
        let created = event(None, PrEventKind::Created);
        let updated = event(None, PrEventKind::Updated);
        assert_ne!(created.dedup_key(), updated.dedup_key());
    }
}
