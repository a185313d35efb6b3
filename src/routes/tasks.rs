// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Job trigger routes.
//!
//! Crawl and discovery runs are long, so those routes start the run in the
//! background and answer `202 Accepted`. Processing one activity is short
//! and returns its report inline.

use crate::error::AppError;
use crate::scheduler;
use crate::services::FlagReport;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Job trigger routes (guarded by the trigger token middleware).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/crawl-activities", post(crawl_activities))
        .route("/tasks/discover-players", post(discover_players))
        .route("/tasks/process-activity", post(process_activity))
}

#[derive(Debug, Deserialize)]
pub struct ProcessActivityPayload {
    pub membership_id: i64,
    pub instance_id: i64,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub job: &'static str,
    pub status: &'static str,
}

async fn crawl_activities(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    // Taken before answering so a discovery triggered right after waits.
    let crawl = state.crawler.claim()?;

    tracing::info!("Activity crawl triggered");
    tokio::spawn(async move { scheduler::run_claimed_crawl_job(&state, crawl).await });

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            job: "crawl_activities",
            status: "accepted",
        }),
    ))
}

async fn discover_players(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<TriggerResponse>) {
    tracing::info!("Player discovery triggered");
    tokio::spawn(async move { scheduler::run_discovery_job(&state).await });

    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            job: "discover_players",
            status: "accepted",
        }),
    )
}

/// Flag one stored activity and return the result.
async fn process_activity(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProcessActivityPayload>,
) -> Result<Json<FlagReport>, AppError> {
    let account = state.account(payload.membership_id).ok_or_else(|| {
        AppError::NotFound(format!("Tracked account {}", payload.membership_id))
    })?;

    let record = state
        .store
        .get_activity(payload.membership_id, payload.instance_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Activity {} for account {}",
                payload.instance_id, payload.membership_id
            ))
        })?;

    tracing::info!(
        membership_id = payload.membership_id,
        instance_id = payload.instance_id,
        "Processing activity from trigger"
    );

    let report = state
        .flagger
        .process(&record, account, &state.shutdown)
        .await?;

    Ok(Json(report))
}
