mod api;
mod config;
mod crossing;
mod events;
mod feed;
mod leaderboard;
mod mapping;
mod player;
mod quest;
mod quest_cache;
mod source;
mod state;
mod store;
mod ttl_cache;
mod waypoint;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppStateInner;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    tracing::info!(
        "waypointer starting, worlds: {:?}, listen: {}, quest source: {}",
        config.worlds,
        config.listen_addr,
        config.waypoints_url,
    );
    if config.positions_url.is_none() {
        tracing::warn!("no position feed configured, scoring is disabled");
    }
    if config.events_url.is_none() {
        tracing::info!("no event schedule configured, warm-up gating is disabled");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let state: crate::state::AppState = Arc::new(AppStateInner::new(config.clone(), client));
    state::spawn_sweeper(state.clone());

    let app = api::router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .context(format!("failed to bind to {}", config.listen_addr))?;

    tracing::info!("listening on {}", config.listen_addr);

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
