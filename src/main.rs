// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Waterfall server
//!
//! Crawls tracked accounts' raid and dungeon history, discovers the players
//! seen alongside them, and flags participants with outlier stats.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use waterfall::{
    config::Config,
    db::{FirestoreDb, MemoryStore, Store},
    models::load_accounts,
    scheduler,
    services::{ActivitySource, BungieClient, DiscordWebhook, NoopSink, NotificationSink},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Waterfall");

    let accounts = load_accounts(&config.accounts_file)?;
    tracing::info!(
        path = %config.accounts_file,
        count = accounts.len(),
        "Tracked accounts loaded"
    );

    let store: Arc<dyn Store> = match &config.gcp_project_id {
        Some(project_id) => Arc::new(FirestoreDb::new(project_id).await?),
        None => {
            tracing::warn!("GCP_PROJECT_ID not set, using in-memory store (data is not persisted)");
            Arc::new(MemoryStore::new())
        }
    };

    let source: Arc<dyn ActivitySource> = Arc::new(BungieClient::from_config(&config));

    let sink: Arc<dyn NotificationSink> = match &config.discord_webhook_url {
        Some(url) => Arc::new(DiscordWebhook::new(url.clone())),
        None => {
            tracing::warn!("DISCORD_WEBHOOK_URL not set, notifications are dropped");
            Arc::new(NoopSink)
        }
    };

    let port = config.port;
    let state = Arc::new(AppState::new(config, accounts, store, source, sink));

    let jobs = scheduler::spawn_all(state.clone());

    let app = waterfall::routes::create_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        })
        .await?;

    for job in jobs {
        if let Err(e) = job.await {
            tracing::error!(error = %e, "Background job panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("waterfall=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
