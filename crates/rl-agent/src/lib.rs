pub mod agent;
pub mod differ;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod outline;
pub mod render;

pub use agent::{AgentDeps, AgentError, ReviewAgent};
pub use differ::DiffError;
pub use orchestrator::Orchestrator;
pub use outline::OutlineError;
