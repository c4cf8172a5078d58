use crate::error::{RedlineError, RepoError, StoreError};
use crate::types::{
    AgentExecution, AgentId, AgentPhase, AgentState, AgentStatus, PrEvent, QueueEntry, RepoId,
    Repository, RunTotals,
};
use chrono::{DateTime, Duration, Utc};
use rl_events::types::EventRecord;

/// Outcome of the claim CAS: either this agent now owns the PR, or another
/// running agent already does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Acquired,
    Held { by: AgentId },
}

pub trait RegistrationRepository {
    fn insert(&self, repository: &Repository) -> Result<(), RepoError>;
    fn set_hook(&self, id: &RepoId, hook_id: Option<&str>) -> Result<Repository, RepoError>;
    fn get(&self, id: &RepoId) -> Result<Option<Repository>, RepoError>;
    fn get_by_platform_id(&self, platform_repo_id: &str) -> Result<Option<Repository>, RepoError>;
    fn get_by_url(&self, url: &str) -> Result<Option<Repository>, RepoError>;
    fn list(&self) -> Result<Vec<Repository>, RepoError>;
    fn delete(&self, id: &RepoId) -> Result<Repository, RepoError>;
}

pub trait QueueRepository {
    /// Append an event; the entry survives restarts and becomes visible
    /// immediately.
    fn enqueue(&self, event: &PrEvent, dedup_key: &str) -> Result<i64, StoreError>;
    /// Lease the oldest visible entry for `visibility`; redelivered if the
    /// worker dies without acking.
    fn dequeue(
        &self,
        worker_id: &str,
        visibility: Duration,
    ) -> Result<Option<QueueEntry>, StoreError>;
    fn ack(&self, entry_id: i64) -> Result<(), StoreError>;
    fn is_queued(&self, dedup_key: &str) -> Result<bool, StoreError>;
    fn len(&self) -> Result<u32, StoreError>;
}

pub trait ClaimRepository {
    /// CAS: succeeds iff no running agent holds `(repository, pr)`.
    fn claim(
        &self,
        repository_id: &RepoId,
        pr_id: i64,
        agent_id: &AgentId,
    ) -> Result<ClaimOutcome, StoreError>;
    /// No-op when `agent_id` is not the holder.
    fn release(
        &self,
        repository_id: &RepoId,
        pr_id: i64,
        agent_id: &AgentId,
    ) -> Result<(), StoreError>;
    fn force_release(&self, repository_id: &RepoId, pr_id: i64) -> Result<(), StoreError>;
    fn holder(&self, repository_id: &RepoId, pr_id: i64) -> Result<Option<AgentId>, StoreError>;
}

pub trait StateRepository {
    /// Last-write-wins; rejects blobs over the 1 MiB cap.
    fn put(&self, agent_id: &AgentId, state: &AgentState) -> Result<(), StoreError>;
    fn get(&self, agent_id: &AgentId) -> Result<Option<AgentState>, StoreError>;
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u32, StoreError>;
}

pub trait WatermarkRepository {
    fn set(&self, repository_id: &RepoId, pr_id: i64, iteration_id: i64) -> Result<(), StoreError>;
    fn get(&self, repository_id: &RepoId, pr_id: i64) -> Result<Option<i64>, StoreError>;
}

pub trait TimeoutRepository {
    fn schedule(&self, agent_id: &AgentId, at: DateTime<Utc>) -> Result<(), StoreError>;
    fn cancel(&self, agent_id: &AgentId) -> Result<(), StoreError>;
    /// Agents whose deadline is at or before `now`, soonest first.
    fn due(&self, now: DateTime<Utc>) -> Result<Vec<AgentId>, StoreError>;
}

pub trait ExecutionRepository {
    fn insert(&self, execution: &AgentExecution) -> Result<(), StoreError>;
    fn set_phase(&self, agent_id: &AgentId, phase: AgentPhase) -> Result<(), StoreError>;
    fn finish(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        totals: &RunTotals,
        error: Option<&str>,
    ) -> Result<AgentExecution, StoreError>;
    fn get(&self, agent_id: &AgentId) -> Result<Option<AgentExecution>, StoreError>;
    fn list(&self, limit: Option<u32>) -> Result<Vec<AgentExecution>, StoreError>;
    fn running(&self) -> Result<Vec<AgentExecution>, StoreError>;
    /// Whether a running or successfully completed run already covers this
    /// dedup key. Failed and timed-out runs do not count, so a redelivered
    /// event can retry them.
    fn dedup_seen(&self, dedup_key: &str) -> Result<bool, StoreError>;
    /// Mark running executions whose deadline has passed as `Timeout` and
    /// return them; boot-time recovery.
    fn recover_expired(&self, now: DateTime<Utc>) -> Result<Vec<AgentExecution>, StoreError>;
}

pub trait EventRepository {
    fn append(&self, event: EventRecord) -> Result<EventRecord, RedlineError>;
    fn list(&self, after: Option<i64>, limit: Option<u32>)
        -> Result<Vec<EventRecord>, RedlineError>;
}

/// Façade over the durable backend. One implementation per storage engine;
/// everything above it is engine-agnostic.
pub trait Store {
    type Registrations<'a>: RegistrationRepository
    where
        Self: 'a;
    type Queue<'a>: QueueRepository
    where
        Self: 'a;
    type Claims<'a>: ClaimRepository
    where
        Self: 'a;
    type States<'a>: StateRepository
    where
        Self: 'a;
    type Watermarks<'a>: WatermarkRepository
    where
        Self: 'a;
    type Timeouts<'a>: TimeoutRepository
    where
        Self: 'a;
    type Executions<'a>: ExecutionRepository
    where
        Self: 'a;
    type Events<'a>: EventRepository
    where
        Self: 'a;

    fn registrations(&self) -> Self::Registrations<'_>;
    fn queue(&self) -> Self::Queue<'_>;
    fn claims(&self) -> Self::Claims<'_>;
    fn states(&self) -> Self::States<'_>;
    fn watermarks(&self) -> Self::Watermarks<'_>;
    fn timeouts(&self) -> Self::Timeouts<'_>;
    fn executions(&self) -> Self::Executions<'_>;
    fn events(&self) -> Self::Events<'_>;

    fn with_tx<F, T>(&self, f: F) -> Result<T, RedlineError>
    where
        F: FnOnce(&Self) -> Result<T, RedlineError>;
}
