use crate::routes::agents::{AgentDetail, AgentListQuery};
use crate::routes::events::EventsQuery;
use crate::routes::repositories::RegisterRepositoryRequest;
use crate::routes::webhooks::WebhookResponse;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rl_core::types::enums::{
    AgentPhase, AgentStatus, FindingCategory, PrEventKind, Severity, ThreadStatus,
};
use rl_core::types::{AgentExecution, ErrorRecord, Repository};
use rl_events::types::{EventRecord, EventSource};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::webhooks::handle_pr_webhook,
        crate::routes::repositories::register_repository,
        crate::routes::repositories::list_repositories,
        crate::routes::repositories::get_repository,
        crate::routes::repositories::unregister_repository,
        crate::routes::agents::list_agents,
        crate::routes::agents::get_agent,
        crate::routes::events::list_events,
        crate::routes::health::health,
    ),
    components(schemas(
        AgentDetail,
        AgentExecution,
        AgentListQuery,
        AgentPhase,
        AgentStatus,
        ErrorRecord,
        EventRecord,
        EventSource,
        EventsQuery,
        FindingCategory,
        PrEventKind,
        RegisterRepositoryRequest,
        Repository,
        Severity,
        ThreadStatus,
        WebhookResponse,
    ))
)]
pub struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn router() -> Router {
    Router::new().route("/openapi.json", get(serve_spec))
}

async fn serve_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
