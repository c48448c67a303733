//! Agent playground server
//!
//! Serves the entity registry over HTTP: JSON for buffered runs and session
//! management, server-sent events for streaming runs.

mod config;
mod demo;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playground_core::{FileSessionStore, SessionStore};
use run_engine::{Dispatcher, EngineConfig};

use crate::config::ServerConfig;
use crate::state::AppState;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .merge(routes::status::router())
        .merge(routes::entities::router())
        .merge(routes::runs::router())
        .merge(routes::sessions::router())
        .with_state(app_state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "playground_server=debug,run_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!("Using data directory: {:?}", config.data_dir);

    let storage: Arc<dyn SessionStore> = Arc::new(
        FileSessionStore::open(&config.data_dir)
            .await
            .context("Failed to open session store")?,
    );
    let registry = demo::registry(storage)
        .await
        .context("Failed to build entity registry")?;
    tracing::info!("Registered {} entities", registry.len());

    let engine_config = EngineConfig::from_env();
    tracing::debug!(?engine_config, "Engine configuration");
    let dispatcher = Dispatcher::new(Arc::new(registry), engine_config);

    let addr = config.addr;
    let app = router(AppState::new(dispatcher, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Playground listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
