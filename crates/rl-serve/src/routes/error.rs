use axum::http::StatusCode;
use axum::Json;
use rl_core::error::{AgentQueryError, IngestError, RedlineError, RepoError, StoreError};
use rl_platform::PlatformError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
    pub correlation_id: Option<String>,
}

pub fn map_error(
    err: &RedlineError,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code, message) = match err {
        RedlineError::Repo(repo) => map_repo_error(repo),
        RedlineError::Ingest(ingest) => map_ingest_error(ingest),
        RedlineError::Agent(agent) => map_agent_error(agent),
        RedlineError::Store(store) => map_store_error(store),
        RedlineError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            message.clone(),
        ),
    };

    (
        status,
        Json(ErrorEnvelope {
            code,
            message,
            correlation_id,
        }),
    )
}

/// Platform failures surfaced by the admin routes (hook registration and
/// repository resolution).
pub fn map_platform_error(
    err: &PlatformError,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code) = match err {
        PlatformError::Unauthorized => (StatusCode::BAD_GATEWAY, "platform_unauthorized"),
        PlatformError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        PlatformError::RateLimited
        | PlatformError::Unavailable { .. }
        | PlatformError::Timeout
        | PlatformError::CircuitOpen => (StatusCode::BAD_GATEWAY, "platform_unavailable"),
        PlatformError::Http { .. } | PlatformError::Decode { .. } => {
            (StatusCode::BAD_GATEWAY, "platform_error")
        }
    };
    (
        status,
        Json(ErrorEnvelope {
            code,
            message: err.to_string(),
            correlation_id,
        }),
    )
}

fn map_repo_error(err: &RepoError) -> (StatusCode, &'static str, String) {
    match err {
        RepoError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        RepoError::AlreadyRegistered => (StatusCode::CONFLICT, "conflict", err.to_string()),
        RepoError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        RepoError::Store { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            err.to_string(),
        ),
    }
}

fn map_ingest_error(err: &IngestError) -> (StatusCode, &'static str, String) {
    match err {
        IngestError::Rejected { .. } => {
            (StatusCode::BAD_REQUEST, "ingest_rejected", err.to_string())
        }
        IngestError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            "ingest_unauthorized",
            err.to_string(),
        ),
        IngestError::Store { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            err.to_string(),
        ),
    }
}

fn map_agent_error(err: &AgentQueryError) -> (StatusCode, &'static str, String) {
    match err {
        AgentQueryError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        AgentQueryError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        AgentQueryError::Store { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            err.to_string(),
        ),
    }
}

fn map_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::Unavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            err.to_string(),
        ),
        StoreError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        StoreError::Conflict { .. } => (StatusCode::CONFLICT, "conflict", err.to_string()),
        StoreError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
    }
}
