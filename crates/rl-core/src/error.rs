use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository not found")]
    NotFound,
    #[error("repository already registered")]
    AlreadyRegistered,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("store error: {message}")]
    Store { message: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("rejected: {message}")]
    Rejected { message: String },
    #[error("signature mismatch")]
    Unauthorized,
    #[error("store error: {message}")]
    Store { message: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("not found")]
    NotFound,
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl StoreError {
    /// Connection-level failures are retried by the resilience kit; logical
    /// errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[derive(Debug, Error)]
pub enum AgentQueryError {
    #[error("agent not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("store error: {message}")]
    Store { message: String },
}

#[derive(Debug, Error)]
pub enum RedlineError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Agent(#[from] AgentQueryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {message}")]
    Internal { message: String },
}
