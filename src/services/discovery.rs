// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Participant discovery across all stored activities.
//!
//! Detail reports are fetched with bounded concurrency. Each task claims the
//! participant IDs it sees through `DashSet::insert`, which is a single
//! atomic insert-if-absent, so every new ID is claimed by exactly one task
//! and the aggregated result needs no de-duplication pass.

use crate::config::{DISCOVERY_CONCURRENCY, PLAYER_CHUNK_SIZE};
use crate::db::Store;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::models::{ActivityRecord, Player};
use crate::services::bungie::ActivitySource;
use crate::services::notify::{send_best_effort, Notification, NotificationSink};
use crate::services::readiness::ReadinessGate;
use dashmap::DashSet;
use futures_util::{future, stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const JOB_NAME: &str = "discover_players";

/// Discovers participants of stored activities and records them as players.
#[derive(Clone)]
pub struct ParticipantDiscovery {
    source: Arc<dyn ActivitySource>,
    store: Arc<dyn Store>,
    gate: Arc<ReadinessGate>,
    sink: Arc<dyn NotificationSink>,
    metrics: Arc<Metrics>,
}

/// Result of one discovery run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DiscoverySummary {
    pub activities_scanned: usize,
    pub reports_failed: usize,
    /// Failed fetches the API refused for throttling
    pub reports_throttled: usize,
    pub players_discovered: usize,
    pub players_inserted: usize,
    pub chunks_committed: usize,
    pub cancelled: bool,
}

enum ReportOutcome {
    /// IDs this task claimed first
    Claimed(Vec<i64>),
    Failed { rate_limited: bool },
}

impl ParticipantDiscovery {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        store: Arc<dyn Store>,
        gate: Arc<ReadinessGate>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            source,
            store,
            gate,
            sink,
            metrics: Arc::new(Metrics::default()),
        }
    }

    /// Count downloaded reports into a shared registry.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Scan every stored activity once and persist newly seen players.
    ///
    /// A failed report fetch only skips that activity. A failed chunk commit
    /// stops the run; chunks committed before it stay committed.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<DiscoverySummary> {
        self.gate.wait_for_metadata(JOB_NAME, cancel).await?;
        self.gate.wait_for_crawl_idle(JOB_NAME, cancel).await?;

        tracing::info!(job = JOB_NAME, "Starting job");
        let started = Instant::now();

        let activities = self.store.list_activities().await?;
        let known: DashSet<i64> = self
            .store
            .list_players()
            .await?
            .into_iter()
            .map(|p| p.membership_id)
            .collect();

        tracing::info!(
            activities = activities.len(),
            known_players = known.len(),
            "Loaded snapshots"
        );

        // Owned items keep the buffered futures `Send` for `tokio::spawn`.
        let known = &known;
        let outcomes: Vec<ReportOutcome> = stream::iter(activities)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(move |activity| async move { self.claim_participants(&activity, known).await })
            .buffer_unordered(DISCOVERY_CONCURRENCY)
            .collect()
            .await;

        let mut summary = DiscoverySummary {
            activities_scanned: outcomes.len(),
            cancelled: cancel.is_cancelled(),
            ..Default::default()
        };

        let mut new_ids = Vec::new();
        for outcome in outcomes {
            match outcome {
                ReportOutcome::Claimed(ids) => new_ids.extend(ids),
                ReportOutcome::Failed { rate_limited } => {
                    summary.reports_failed += 1;
                    if rate_limited {
                        summary.reports_throttled += 1;
                    }
                }
            }
        }
        summary.players_discovered = new_ids.len();

        if summary.reports_throttled > 0 {
            send_best_effort(
                self.sink.as_ref(),
                &Notification::warning(format!(
                    "Bungie API throttled {} of {} detail report requests",
                    summary.reports_throttled, summary.activities_scanned
                )),
            )
            .await;
        }

        for chunk in new_ids.chunks(PLAYER_CHUNK_SIZE) {
            match self.commit_chunk(chunk).await {
                Ok(inserted) => {
                    summary.chunks_committed += 1;
                    summary.players_inserted += inserted;
                }
                Err(e) => {
                    tracing::error!(
                        job = JOB_NAME,
                        error = %e,
                        chunks_committed = summary.chunks_committed,
                        players_inserted = summary.players_inserted,
                        remaining = summary.players_discovered - summary.players_inserted,
                        "Player chunk commit failed, aborting remaining chunks"
                    );
                    send_best_effort(
                        self.sink.as_ref(),
                        &Notification::error(format!(
                            "Player discovery aborted after {} chunks: {}",
                            summary.chunks_committed, e
                        )),
                    )
                    .await;
                    return Err(e);
                }
            }
        }

        tracing::info!(
            job = JOB_NAME,
            elapsed_ms = started.elapsed().as_millis() as u64,
            scanned = summary.activities_scanned,
            failed = summary.reports_failed,
            throttled = summary.reports_throttled,
            discovered = summary.players_discovered,
            added = summary.players_inserted,
            cancelled = summary.cancelled,
            "Finished job"
        );

        Ok(summary)
    }

    /// Fetch one activity's report and claim its unseen participants.
    async fn claim_participants(
        &self,
        activity: &ActivityRecord,
        known: &DashSet<i64>,
    ) -> ReportOutcome {
        let report = match self.source.get_detail_report(activity.instance_id).await {
            Ok(report) => report,
            Err(e) => {
                let rate_limited = e.is_rate_limited();
                tracing::warn!(
                    instance_id = activity.instance_id,
                    rate_limited,
                    error = %e,
                    "Failed to fetch detail report, skipping activity"
                );
                return ReportOutcome::Failed { rate_limited };
            }
        };
        self.metrics.record_report_downloaded();

        let claimed: Vec<i64> = report
            .participant_ids()
            .into_iter()
            .filter(|id| known.insert(*id))
            .collect();

        tracing::debug!(
            instance_id = activity.instance_id,
            participants = report.entries.len(),
            new = claimed.len(),
            "Processed detail report"
        );

        ReportOutcome::Claimed(claimed)
    }

    /// Re-check the store and insert the chunk's still-missing players.
    ///
    /// The snapshot may be stale by now (the flagger also creates players),
    /// so existence is checked right before the write.
    async fn commit_chunk(&self, ids: &[i64]) -> Result<usize> {
        let mut fresh = Vec::with_capacity(ids.len());
        for &id in ids {
            if !self.store.player_exists(id).await? {
                fresh.push(Player::new(id));
            }
        }

        if fresh.is_empty() {
            return Ok(0);
        }

        self.store.insert_players(&fresh).await?;
        tracing::debug!(count = fresh.len(), "Committed player chunk");
        Ok(fresh.len())
    }
}
