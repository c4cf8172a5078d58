use crate::middleware::correlation::CorrelationId;
use crate::routes::error::{map_error, map_platform_error};
use crate::{build_redline, AppState};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use rl_core::error::RepoError;
use rl_core::redline::RegisterRepositoryInput;
use rl_core::types::{RepoCoordinates, RepoId, Repository};
use rl_events::types::EventSource;
use utoipa::ToSchema;

const HOOK_EVENT_TYPES: &[&str] = &["git.pullrequest.created", "git.pullrequest.updated"];

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct RegisterRepositoryRequest {
    /// `https://dev.azure.com/{organization}/{project}/_git/{repository}`
    pub url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/repositories", post(register_repository).get(list_repositories))
        .route(
            "/repositories/:id",
            get(get_repository).delete(unregister_repository),
        )
        .with_state(state)
}

/// Register a repository: resolve it on the platform, persist the
/// registration, then subscribe the service hooks and record their ids.
#[utoipa::path(
    post,
    path = "/api/repositories",
    request_body = RegisterRepositoryRequest,
    responses((status = 200, body = Repository))
)]
pub(crate) async fn register_repository(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<RegisterRepositoryRequest>,
) -> Response {
    let Some(coordinates) = RepoCoordinates::parse(&input.url) else {
        return map_error(
            &RepoError::InvalidInput {
                message: format!("not an Azure DevOps git URL: {}", input.url),
            }
            .into(),
            Some(correlation.0),
        )
        .into_response();
    };
    if coordinates.organization != state.settings.organization {
        return map_error(
            &RepoError::InvalidInput {
                message: format!(
                    "repository belongs to organization {}, service is configured for {}",
                    coordinates.organization, state.settings.organization
                ),
            }
            .into(),
            Some(correlation.0),
        )
        .into_response();
    }

    let platform_repo = match state
        .platform
        .get_repository(&coordinates.project, &coordinates.name)
        .await
    {
        Ok(repo) => repo,
        Err(err) => return map_platform_error(&err, Some(correlation.0)).into_response(),
    };

    let redline = match build_redline(&state) {
        Ok(redline) => redline,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = rl_core::RequestContext::new(EventSource::Admin, Some(correlation.0.clone()));
    let registered = match redline.repositories().register(
        &ctx,
        RegisterRepositoryInput {
            url: input.url.clone(),
            coordinates,
            platform_repo_id: platform_repo.id.clone(),
        },
    ) {
        Ok(repository) => repository,
        Err(err) => return map_error(&err, ctx.correlation_id).into_response(),
    };

    let webhook_url = state.settings.webhook_url();
    let mut hook_ids = Vec::new();
    for event_type in HOOK_EVENT_TYPES {
        match state
            .platform
            .register_hook(&platform_repo.id, event_type, &webhook_url)
            .await
        {
            Ok(hook_id) => hook_ids.push(hook_id),
            Err(err) => {
                // Roll the registration back rather than leave it half
                // subscribed.
                for hook_id in &hook_ids {
                    let _ = state.platform.unregister_hook(hook_id).await;
                }
                let _ = redline.repositories().unregister(&ctx, &registered.id);
                return map_platform_error(&err, ctx.correlation_id).into_response();
            }
        }
    }

    match redline
        .repositories()
        .set_hook(&ctx, &registered.id, Some(&hook_ids.join(",")))
    {
        Ok(repository) => Json(repository).into_response(),
        Err(err) => map_error(&err, ctx.correlation_id).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/repositories",
    responses((status = 200, body = Vec<Repository>))
)]
pub(crate) async fn list_repositories(State(state): State<AppState>) -> Response {
    let redline = match build_redline(&state) {
        Ok(redline) => redline,
        Err(err) => return map_error(&err, None).into_response(),
    };
    match redline.repositories().list() {
        Ok(repositories) => Json(repositories).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/repositories/{id}",
    params(("id" = String, Path, description = "Repository ID")),
    responses((status = 200, body = Repository))
)]
pub(crate) async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let redline = match build_redline(&state) {
        Ok(redline) => redline,
        Err(err) => return map_error(&err, None).into_response(),
    };
    let repo_id = match RepoId::new(id) {
        Ok(id) => id,
        Err(err) => {
            return map_error(
                &RepoError::InvalidInput {
                    message: err.to_string(),
                }
                .into(),
                None,
            )
            .into_response()
        }
    };
    match redline.repositories().get(&repo_id) {
        Ok(Some(repository)) => Json(repository).into_response(),
        Ok(None) => map_error(&RepoError::NotFound.into(), None).into_response(),
        Err(err) => map_error(&err, None).into_response(),
    }
}

/// Remove the registration and tear down its platform hooks.
#[utoipa::path(
    delete,
    path = "/api/repositories/{id}",
    params(("id" = String, Path, description = "Repository ID")),
    responses((status = 200))
)]
pub(crate) async fn unregister_repository(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let redline = match build_redline(&state) {
        Ok(redline) => redline,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let repo_id = match RepoId::new(id) {
        Ok(id) => id,
        Err(err) => {
            return map_error(
                &RepoError::InvalidInput {
                    message: err.to_string(),
                }
                .into(),
                Some(correlation.0),
            )
            .into_response()
        }
    };
    let ctx = rl_core::RequestContext::new(EventSource::Admin, Some(correlation.0));
    let removed = match redline.repositories().unregister(&ctx, &repo_id) {
        Ok(repository) => repository,
        Err(err) => return map_error(&err, ctx.correlation_id).into_response(),
    };

    if let Some(hook_id) = &removed.hook_id {
        for id in hook_id.split(',').filter(|id| !id.is_empty()) {
            if let Err(err) = state.platform.unregister_hook(id).await {
                tracing::warn!(hook_id = %id, error = %err, "hook teardown failed");
            }
        }
    }
    Json(serde_json::json!({ "ok": true })).into_response()
}
