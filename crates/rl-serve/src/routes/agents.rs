use crate::routes::error::map_error;
use crate::{build_redline, AppState};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rl_core::error::AgentQueryError;
use rl_core::types::{AgentExecution, AgentId};
use serde::Serialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, serde::Deserialize, ToSchema, IntoParams)]
pub struct AgentListQuery {
    pub limit: Option<u32>,
}

/// Execution record plus, while it is still retained, the checkpointed
/// run-time state blob.
#[derive(Debug, Serialize, ToSchema)]
pub struct AgentDetail {
    pub execution: AgentExecution,
    #[schema(value_type = Object)]
    pub state: Option<serde_json::Value>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/:id", get(get_agent))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/agents",
    params(AgentListQuery),
    responses((status = 200, body = Vec<AgentExecution>))
)]
pub(crate) async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<AgentListQuery>,
) -> Response {
    let redline = match build_redline(&state) {
        Ok(redline) => redline,
        Err(err) => return map_error(&err, None).into_response(),
    };
    match redline.agents().list(query.limit) {
        Ok(executions) => Json(executions).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/agents/{id}",
    params(("id" = String, Path, description = "Agent ID")),
    responses((status = 200, body = AgentDetail))
)]
pub(crate) async fn get_agent(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let redline = match build_redline(&state) {
        Ok(redline) => redline,
        Err(err) => return map_error(&err, None).into_response(),
    };
    let agent_id = match AgentId::new(id) {
        Ok(id) => id,
        Err(err) => {
            return map_error(
                &AgentQueryError::InvalidInput {
                    message: err.to_string(),
                }
                .into(),
                None,
            )
            .into_response()
        }
    };
    match redline.agents().require(&agent_id) {
        Ok((execution, state_blob)) => {
            let state = state_blob.and_then(|blob| serde_json::to_value(blob).ok());
            Json(AgentDetail { execution, state }).into_response()
        }
        Err(err) => map_error(&err, None).into_response(),
    }
}
