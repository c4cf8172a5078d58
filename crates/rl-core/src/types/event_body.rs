use crate::types::agent::AgentExecution;
use crate::types::enums::{AgentPhase, PrEventKind};
use crate::types::ids::{AgentId, RepoId};
use crate::types::repo::Repository;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Review lifecycle events, appended to the store inside the transaction of
/// the mutation they describe and fanned out on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload")]
pub enum EventBody {
    RepositoryRegistered {
        repository: Repository,
    },
    RepositoryUnregistered {
        repository_id: RepoId,
    },

    ReviewQueued {
        entry_id: i64,
        repository_id: RepoId,
        pr_id: i64,
        kind: PrEventKind,
    },
    ReviewDropped {
        pr_id: i64,
        reason: String,
    },

    AgentSpawned {
        agent_id: AgentId,
        repository_id: RepoId,
        pr_id: i64,
    },
    PhaseCompleted {
        agent_id: AgentId,
        pr_id: i64,
        from: AgentPhase,
        to: AgentPhase,
        ms: u64,
    },
    AgentCompleted {
        execution: AgentExecution,
    },
    AgentFailed {
        execution: AgentExecution,
    },
    AgentTimedOut {
        execution: AgentExecution,
    },
    StaleAgentKilled {
        pr_id: i64,
        previous: AgentId,
        replacement: AgentId,
    },

    WatermarkAdvanced {
        repository_id: RepoId,
        pr_id: i64,
        iteration_id: i64,
    },
    DiffFallback {
        agent_id: AgentId,
        pr_id: i64,
        reason: String,
    },
    FindingsPublished {
        agent_id: AgentId,
        pr_id: i64,
        posted: u32,
        duplicates_skipped: u32,
    },
}
