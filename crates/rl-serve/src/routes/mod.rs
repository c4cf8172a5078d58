pub mod agents;
pub mod error;
pub mod events;
pub mod health;
pub mod repositories;
pub mod webhooks;

use crate::middleware::correlation::correlation_middleware;
use crate::{openapi, AppState};
use axum::middleware;
use axum::Router;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(webhooks::router(state.clone()))
        .merge(repositories::router(state.clone()))
        .merge(agents::router(state.clone()))
        .merge(events::router(state.clone()))
        .merge(health::router(state.clone()))
        .merge(openapi::router())
        .route_layer(middleware::from_fn(correlation_middleware));

    Router::new().nest("/api", api)
}
