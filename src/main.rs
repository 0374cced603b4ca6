mod api;
mod callbacks;
mod config;
mod credentials;
mod eas;
mod error;
mod http;
mod model;
mod orchestrator;
mod request;
mod store;
mod util;
mod wbxml;

use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use api::ApiState;
use callbacks::CallbackHub;
use config::Config;
use http::HttpTransport;
use orchestrator::Orchestrator;
use store::sqlite::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = Config::parse();

    tracing::info!(database_file = %config.database_file, "using store database");
    let store = Arc::new(SqliteStore::new(&config.database_file).await?);

    let state_dir = std::path::Path::new(&config.state_dir);
    let device_id = credentials::load_or_create_device_id(state_dir).await?;
    tracing::info!(device_id = %device_id, "device id ready");

    let http = Arc::new(HttpTransport::new(config.http_connect_timeout(), config.allow_invalid_certs)?);
    let callbacks = CallbackHub::new();

    let orchestrator = Orchestrator::new(store, http, callbacks, device_id, config.sync_policy());
    orchestrator.spawn_background_tasks();

    let app = api::build_api_router()
        .with_state(ApiState { orchestrator })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
