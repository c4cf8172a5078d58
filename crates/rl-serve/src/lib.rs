pub mod middleware;
pub mod openapi;
pub mod routes;

use rl_core::config::Settings;
use rl_core::{Redline, RedlineError};
use rl_db::schema;
use rl_db::store::DbStore;
use rl_events::bus::EventBus;
use rl_platform::Platform;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub event_bus: EventBus,
    pub platform: Arc<dyn Platform>,
}

pub fn build_redline(state: &AppState) -> Result<Redline<DbStore>, RedlineError> {
    let conn = schema::open_and_migrate(&state.settings.db_path).map_err(|err| {
        RedlineError::Internal {
            message: err.to_string(),
        }
    })?;
    Ok(Redline::new(DbStore::new(conn), state.event_bus.clone()))
}

pub fn app(state: AppState) -> axum::Router {
    routes::router(state)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http surface listening");
    axum::serve(listener, app(state)).await
}
