// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feedkeeper API Server
//!
//! Keeps Spotify listening history and Strava activities synchronized with
//! their providers.

use feedkeeper::{config::Config, db::SqliteDb, AppState, ProviderClients};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Feedkeeper API");

    let db = SqliteDb::open(&config.database_path)?;

    let clients = ProviderClients::from_config(&config);
    if config.revalidate_url.is_none() {
        tracing::info!("REVALIDATE_URL not set, cache invalidation disabled");
    }

    let state = Arc::new(AppState::new(config.clone(), db, clients));

    // Build router
    let app = feedkeeper::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feedkeeper=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
