use crate::types::delta::ChangeDelta;
use crate::types::enums::{AgentPhase, AgentStatus, PrEventKind};
use crate::types::event::{PrEvent, PrSnapshot};
use crate::types::finding::{LineFinding, SummaryFinding};
use crate::types::ids::{AgentId, RepoId};
use crate::types::outline::SourceOutline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Durable record of one agent run, kept in `agent_executions`. The run-time
/// state blob lives in the KV store and expires; this row is the permanent
/// trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentExecution {
    pub agent_id: AgentId,
    pub repository_id: RepoId,
    pub pr_id: i64,
    pub dedup_key: String,
    pub phase: AgentPhase,
    pub status: AgentStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub files_analyzed: u32,
    pub findings_posted: u32,
    pub duplicates_skipped: u32,
    pub resolutions_marked: u32,
    pub api_calls: u32,
    pub api_errors: u32,
    pub error: Option<String>,
}

/// Counters accumulated while a run executes, folded into the execution row
/// at terminal time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunTotals {
    pub files_analyzed: u32,
    pub findings_posted: u32,
    pub duplicates_skipped: u32,
    pub resolutions_marked: u32,
    pub api_calls: u32,
    pub api_errors: u32,
}

/// A partial failure recorded mid-run. These never abort the phase that
/// collected them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRecord {
    pub phase: AgentPhase,
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(phase: AgentPhase, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind: kind.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Everything a run knows, checkpointed to the state store after every phase
/// transition so a crashed process leaves an inspectable trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: AgentId,
    pub pr_id: i64,
    pub repository_id: RepoId,
    pub event: PrEvent,
    pub phase: AgentPhase,
    pub started_at: DateTime<Utc>,
    pub pr: Option<PrSnapshot>,
    pub iteration_id: Option<i64>,
    pub last_reviewed_iteration: Option<i64>,
    pub delta: Option<ChangeDelta>,
    pub outlines: HashMap<String, SourceOutline>,
    pub findings: Vec<LineFinding>,
    pub summary: Option<SummaryFinding>,
    pub errors: Vec<ErrorRecord>,
    pub phase_timings: HashMap<AgentPhase, u64>,
}

impl AgentState {
    pub fn new(agent_id: AgentId, event: PrEvent) -> Self {
        Self {
            agent_id,
            pr_id: event.pr_id,
            repository_id: event.repository_id.clone(),
            event,
            phase: AgentPhase::Init,
            started_at: Utc::now(),
            pr: None,
            iteration_id: None,
            last_reviewed_iteration: None,
            delta: None,
            outlines: HashMap::new(),
            findings: Vec::new(),
            summary: None,
            errors: Vec::new(),
            phase_timings: HashMap::new(),
        }
    }

    pub fn is_update(&self) -> bool {
        self.event.kind == PrEventKind::Updated
    }

    pub fn record_error(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ErrorRecord::new(self.phase, kind, message));
    }
}
