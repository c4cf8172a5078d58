use crate::middleware::correlation::CorrelationId;
use crate::routes::error::map_error;
use crate::{build_redline, AppState};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use rl_core::error::IngestError;
use rl_core::ingest::{self, Normalized};
use rl_core::redline::{DropReason, IngestOutcome};
use rl_core::RedlineError;
use rl_events::types::EventSource;
use serde::Serialize;
use utoipa::ToSchema;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/azure-devops/pr", post(handle_pr_webhook))
        .with_state(state)
}

/// Webhook sink. Verifies, normalizes and enqueues; always acks well-formed
/// payloads with a 200 so the platform does not retry unmonitored or
/// duplicate deliveries.
#[utoipa::path(
    post,
    path = "/api/webhooks/azure-devops/pr",
    responses(
        (status = 200, body = WebhookResponse),
        (status = 400, description = "malformed payload"),
        (status = 401, description = "signature mismatch")
    )
)]
pub(crate) async fn handle_pr_webhook(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.settings.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Err(err) = ingest::verify_signature(secret, &body, signature) {
            tracing::warn!(correlation_id = %correlation.0, "webhook signature rejected");
            return map_error(&RedlineError::Ingest(err), Some(correlation.0)).into_response();
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            return map_error(
                &RedlineError::Ingest(IngestError::Rejected {
                    message: format!("invalid json: {err}"),
                }),
                Some(correlation.0),
            )
            .into_response()
        }
    };

    let normalized = match ingest::normalize(&payload) {
        Ok(Normalized::Event(event)) => event,
        Ok(Normalized::UnknownKind(kind)) => {
            tracing::info!(kind = %kind, "ignoring event type");
            return Json(WebhookResponse {
                status: "ignored".to_string(),
                message: format!("event type {kind} not processed"),
            })
            .into_response();
        }
        Err(err) => {
            return map_error(&RedlineError::Ingest(err), Some(correlation.0)).into_response()
        }
    };

    let redline = match build_redline(&state) {
        Ok(redline) => redline,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = rl_core::RequestContext::new(EventSource::Webhook, Some(correlation.0.clone()));
    match redline.ingest().accept(&ctx, normalized) {
        Ok(IngestOutcome::Queued { pr_id, .. }) => Json(WebhookResponse {
            status: "accepted".to_string(),
            message: format!("review queued for PR {pr_id}"),
        })
        .into_response(),
        Ok(IngestOutcome::Dropped(reason)) => {
            let message = match reason {
                DropReason::Unmonitored { platform_repo_id } => {
                    tracing::info!(
                        platform_repo_id = %platform_repo_id,
                        "event for unmonitored repository ignored"
                    );
                    "repository is not monitored".to_string()
                }
                DropReason::Duplicate { dedup_key } => {
                    tracing::info!(dedup_key = %dedup_key, "duplicate delivery dropped");
                    "duplicate delivery".to_string()
                }
            };
            Json(WebhookResponse {
                status: "ignored".to_string(),
                message,
            })
            .into_response()
        }
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}
