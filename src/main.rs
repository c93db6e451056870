// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Matchify API Server
//!
//! Plan entitlements, discovery feeds and realtime chat for the
//! Matchify dating app.

use matchify::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryDb, Store},
    services::scheduler::spawn_daily_reset,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Matchify API");

    let db: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, state will not survive a restart");
            Arc::new(MemoryDb::new())
        }
    };

    let state = Arc::new(AppState::new(config.clone(), db));

    let seeded = state.entitlements.seed_default_plans().await?;
    tracing::info!(seeded, "Plan catalog ready");

    if config.daily_reset_scheduler {
        spawn_daily_reset(state.entitlements.clone());
        tracing::info!("Daily usage reset scheduled");
    }

    // Build router
    let app = matchify::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("matchify=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
