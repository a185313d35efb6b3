// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process counters, rendered in the Prometheus text format on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    reports_downloaded: AtomicU64,
}

impl Metrics {
    /// One detail report fetched by participant discovery.
    pub fn record_report_downloaded(&self) {
        self.reports_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reports_downloaded(&self) -> u64 {
        self.reports_downloaded.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        format!(
            "# HELP waterfall_pgcrs_downloaded_total Number of PGCRs downloaded.\n\
# TYPE waterfall_pgcrs_downloaded_total counter\n\
waterfall_pgcrs_downloaded_total {}\n",
            self.reports_downloaded()
        )
    }
}
