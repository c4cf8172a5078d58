use crate::AppState;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

#[utoipa::path(get, path = "/api/health", responses((status = 200)))]
pub(crate) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
