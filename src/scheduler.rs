// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process job scheduling.
//!
//! The crawl and the discovery pass run back to back, once at startup and
//! then on a fixed cadence until the shutdown token is cancelled. The same
//! job bodies back the `/tasks/*` routes, so an external scheduler can
//! trigger them too.

use crate::config::METADATA_RETRY_DELAY;
use crate::error::AppError;
use crate::models::ActivityRecord;
use crate::services::readiness::CrawlGuard;
use crate::services::{ActivitySource, ReadinessGate};
use crate::AppState;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Start the metadata loader and the periodic jobs.
pub fn spawn_all(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    let interval = state.config.job_interval;
    let mut handles = Vec::new();

    handles.push({
        let source = state.source.clone();
        let gate = state.gate.clone();
        let cancel = state.shutdown.clone();
        tokio::spawn(async move {
            load_metadata(source.as_ref(), &gate, &cancel, METADATA_RETRY_DELAY).await;
        })
    });

    handles.push({
        let state = state.clone();
        spawn_periodic("crawl_and_discover", interval, state.shutdown.clone(), move || {
            let state = state.clone();
            async move { run_cycle(&state).await }
        })
    });

    handles
}

/// Run `job` immediately, then every `interval`, until cancelled.
///
/// A run that overlaps the next tick delays it rather than stacking runs.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tracing::debug!(job = name, "Scheduled run starting");
            job().await;
        }

        tracing::info!(job = name, "Scheduler stopped");
    })
}

/// Load remote metadata, retrying until it succeeds, then open the gate.
pub async fn load_metadata(
    source: &dyn ActivitySource,
    gate: &ReadinessGate,
    cancel: &CancellationToken,
    retry_delay: Duration,
) {
    loop {
        match source.load_metadata().await {
            Ok(version) => {
                if gate.mark_metadata_ready() {
                    tracing::info!(version = %version, "Bungie metadata loaded");
                }
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load Bungie metadata, retrying");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}

/// One scheduled cycle: crawl, then discover over what the crawl stored.
pub async fn run_cycle(state: &AppState) {
    run_crawl_job(state).await;
    if state.shutdown.is_cancelled() {
        return;
    }
    run_discovery_job(state).await;
}

/// Crawl once, then flag the new records if configured to.
pub async fn run_crawl_job(state: &AppState) {
    match state.crawler.claim() {
        Ok(crawl) => run_claimed_crawl_job(state, crawl).await,
        Err(e) => {
            tracing::warn!(job = "crawl_activities", error = %e, "Run skipped");
        }
    }
}

/// [`run_crawl_job`] with the crawl slot already taken.
pub async fn run_claimed_crawl_job(state: &AppState, crawl: CrawlGuard) {
    match state.crawler.run_claimed(crawl, &state.shutdown).await {
        Ok(summary) => {
            if state.config.flag_new_activities {
                flag_records(state, &summary.new_records).await;
            }
        }
        Err(AppError::Cancelled) => {
            tracing::info!(job = "crawl_activities", "Run cancelled before start");
        }
        Err(e) => {
            tracing::error!(job = "crawl_activities", error = %e, "Run failed");
        }
    }
}

pub async fn run_discovery_job(state: &AppState) {
    match state.discovery.run(&state.shutdown).await {
        Ok(_) => {}
        Err(AppError::Cancelled) => {
            tracing::info!(job = "discover_players", "Run cancelled before start");
        }
        Err(e) => {
            tracing::error!(job = "discover_players", error = %e, "Run failed");
        }
    }
}

/// Flag each record; one record's failure does not stop the others.
async fn flag_records(state: &AppState, records: &[ActivityRecord]) {
    for record in records {
        if state.shutdown.is_cancelled() {
            break;
        }

        let Some(account) = state.account(record.membership_id) else {
            continue;
        };

        if let Err(e) = state
            .flagger
            .process(record, account, &state.shutdown)
            .await
        {
            tracing::warn!(
                instance_id = record.instance_id,
                membership_id = record.membership_id,
                error = %e,
                "Failed to flag activity"
            );
        }
    }
}
