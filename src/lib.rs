// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Waterfall: activity history crawler and participant flagger
//!
//! This crate crawls tracked Destiny 2 accounts' activity history into a
//! store, discovers everyone who played alongside them, and posts a
//! notification for participants whose stats cross configured thresholds.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use metrics::Metrics;
use models::{RosterList, TrackedAccount};
use services::{
    ActivityCrawler, ActivitySource, NotificationSink, ParticipantDiscovery, ReadinessGate,
    ThresholdFlagger,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub accounts: Arc<Vec<TrackedAccount>>,
    pub store: Arc<dyn Store>,
    pub source: Arc<dyn ActivitySource>,
    pub gate: Arc<ReadinessGate>,
    pub crawler: ActivityCrawler,
    pub discovery: ParticipantDiscovery,
    pub flagger: ThresholdFlagger,
    pub metrics: Arc<Metrics>,
    /// Cancelled on shutdown; every job observes it between units of work
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the jobs to their capabilities.
    ///
    /// The flagging roster is every configured account.
    pub fn new(
        config: Config,
        accounts: Vec<TrackedAccount>,
        store: Arc<dyn Store>,
        source: Arc<dyn ActivitySource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let gate = Arc::new(ReadinessGate::new());
        let roster = Arc::new(RosterList::from_accounts(&accounts));
        let accounts = Arc::new(accounts);

        let crawler = ActivityCrawler::new(
            source.clone(),
            store.clone(),
            gate.clone(),
            accounts.clone(),
        );
        let metrics = Arc::new(Metrics::default());
        let discovery =
            ParticipantDiscovery::new(source.clone(), store.clone(), gate.clone(), sink.clone())
                .with_metrics(metrics.clone());
        let flagger = ThresholdFlagger::new(
            source.clone(),
            store.clone(),
            gate.clone(),
            sink,
            roster,
            config.thresholds,
        );

        Self {
            config,
            accounts,
            store,
            source,
            gate,
            crawler,
            discovery,
            flagger,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// Look up a tracked account by membership ID.
    pub fn account(&self, membership_id: i64) -> Option<&TrackedAccount> {
        self.accounts
            .iter()
            .find(|a| a.membership_id == membership_id)
    }
}
