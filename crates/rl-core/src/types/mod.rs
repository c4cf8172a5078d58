pub mod agent;
pub mod delta;
pub mod enums;
pub mod event;
pub mod event_body;
pub mod finding;
pub mod ids;
pub mod outline;
pub mod repo;
pub mod thread;

pub use agent::{AgentExecution, AgentState, ErrorRecord, RunTotals};
pub use delta::{ChangeDelta, FileSlice};
pub use enums::{
    AgentPhase, AgentStatus, ChangeKind, FindingCategory, FixVerdict, PrEventKind, Severity,
    SliceKind, ThreadStatus,
};
pub use event::{PrEvent, PrSnapshot, QueueEntry};
pub use event_body::EventBody;
pub use finding::{LineFinding, SummaryFinding};
pub use ids::{AgentId, IdError, RepoId};
pub use outline::{CodeContext, Definition, DefinitionKind, SourceOutline};
pub use repo::{RepoCoordinates, Repository};
pub use thread::{CommentThread, IterationChange, IterationInfo, NewThread, RepoHandle};
