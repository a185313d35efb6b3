// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-wide readiness signals shared by the jobs.
//!
//! Two independent flags, both false at startup:
//! - metadata ready: set once after the Bungie manifest loads, never cleared
//! - crawl in flight: held by a [`CrawlGuard`] for the length of a crawl run
//!
//! Waiters poll at [`READINESS_POLL_INTERVAL`]; every job here is a
//! low-frequency batch run so the latency does not matter.

use crate::config::READINESS_POLL_INTERVAL;
use crate::error::{AppError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct ReadinessGate {
    metadata_ready: AtomicBool,
    crawl_in_flight: AtomicBool,
    poll_interval: Duration,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::with_poll_interval(READINESS_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            metadata_ready: AtomicBool::new(false),
            crawl_in_flight: AtomicBool::new(false),
            poll_interval,
        }
    }

    /// Record that remote metadata has loaded.
    ///
    /// Returns `true` only for the call that flipped the flag.
    pub fn mark_metadata_ready(&self) -> bool {
        !self.metadata_ready.swap(true, Ordering::AcqRel)
    }

    pub fn is_metadata_ready(&self) -> bool {
        self.metadata_ready.load(Ordering::Acquire)
    }

    pub fn is_crawl_in_flight(&self) -> bool {
        self.crawl_in_flight.load(Ordering::Acquire)
    }

    /// Claim the crawl slot.
    ///
    /// Returns `None` if another crawl already holds it. The slot is released
    /// when the returned guard drops, whether the run succeeded or not.
    pub fn begin_crawl(self: &Arc<Self>) -> Option<CrawlGuard> {
        self.crawl_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CrawlGuard { gate: self.clone() })
    }

    /// Wait until metadata is ready or the run is cancelled.
    pub async fn wait_for_metadata(&self, job: &str, cancel: &CancellationToken) -> Result<()> {
        if self.is_metadata_ready() {
            return Ok(());
        }
        tracing::info!(job, "Waiting for Bungie metadata");
        self.poll_until(cancel, || self.is_metadata_ready()).await
    }

    /// Wait until no crawl is running or the run is cancelled.
    pub async fn wait_for_crawl_idle(&self, job: &str, cancel: &CancellationToken) -> Result<()> {
        if !self.is_crawl_in_flight() {
            return Ok(());
        }
        tracing::info!(job, "Waiting for activity crawl to finish");
        self.poll_until(cancel, || !self.is_crawl_in_flight()).await
    }

    async fn poll_until(&self, cancel: &CancellationToken, ready: impl Fn() -> bool) -> Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = ticker.tick() => {
                    if ready() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Holds the crawl-in-flight flag; clears it on drop.
#[derive(Debug)]
pub struct CrawlGuard {
    gate: Arc<ReadinessGate>,
}

impl Drop for CrawlGuard {
    fn drop(&mut self) {
        self.gate.crawl_in_flight.store(false, Ordering::Release);
    }
}
