use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PrEventKind {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AgentStatus {
    Running,
    Completed,
    Failed,
    Timeout,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Phases of a single review run, in dispatch order. `LoadWatermark`,
/// `Diff` and `ResolutionCheck` are reached only on update events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AgentPhase {
    Init,
    FetchMeta,
    LoadWatermark,
    Diff,
    FullList,
    Parse,
    LineAnalysis,
    ArchAnalysis,
    ResolutionCheck,
    Publish,
    Done,
    Error,
}

impl AgentPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum FindingCategory {
    CodeSmell,
    Bug,
    Security,
    BestPractice,
    Architecture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum SliceKind {
    Added,
    Modified,
}

/// File-level change kind as reported by the platform's iteration change
/// list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ChangeKind {
    Add,
    Edit,
    Delete,
    Rename,
    Other,
}

/// Thread resolution states the service reads or writes. The platform knows
/// more states; the review core never sets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Active,
    Fixed,
    Closed,
    Pending,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum FixVerdict {
    Resolved,
    Unresolved,
    Unknown,
}
