// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity history crawl.
//!
//! For each tracked account:
//! 1. Resolve the account's first character (only one is tracked)
//! 2. Page through its history until an empty page comes back
//! 3. Skip occurrences already in the store
//! 4. Commit the account's new records in atomic batches

use crate::db::{Store, MAX_BATCH_WRITES};
use crate::error::{AppError, Result};
use crate::models::{ActivityOccurrence, ActivityRecord, TrackedAccount};
use crate::services::bungie::ActivitySource;
use crate::services::readiness::{CrawlGuard, ReadinessGate};
use crate::time_utils::truncate_to_seconds;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const JOB_NAME: &str = "crawl_activities";

/// Crawls tracked accounts' activity history into the store.
#[derive(Clone)]
pub struct ActivityCrawler {
    source: Arc<dyn ActivitySource>,
    store: Arc<dyn Store>,
    gate: Arc<ReadinessGate>,
    accounts: Arc<Vec<TrackedAccount>>,
}

/// Result of one crawl run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CrawlSummary {
    pub accounts_processed: u32,
    pub accounts_failed: u32,
    pub pages_fetched: u32,
    /// Records persisted by this run, in commit order
    pub new_records: Vec<ActivityRecord>,
    pub cancelled: bool,
}

impl ActivityCrawler {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        store: Arc<dyn Store>,
        gate: Arc<ReadinessGate>,
        accounts: Arc<Vec<TrackedAccount>>,
    ) -> Self {
        Self {
            source,
            store,
            gate,
            accounts,
        }
    }

    /// Crawl every tracked account once.
    ///
    /// A failure inside one account is logged and the run moves on to the
    /// next account. Only a cancelled wait or an overlapping crawl fails the
    /// whole run.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<CrawlSummary> {
        let crawl = self.claim()?;
        self.run_claimed(crawl, cancel).await
    }

    /// Take the crawl slot ahead of a run started later.
    ///
    /// Discovery treats the slot as in flight from this point on, including
    /// while the run waits for metadata.
    pub fn claim(&self) -> Result<CrawlGuard> {
        self.gate.begin_crawl().ok_or_else(|| {
            AppError::BadRequest("Activity crawl already in progress".to_string())
        })
    }

    /// Run with a slot taken by [`ActivityCrawler::claim`]; it is released
    /// when the run ends.
    pub async fn run_claimed(
        &self,
        _crawl: CrawlGuard,
        cancel: &CancellationToken,
    ) -> Result<CrawlSummary> {
        self.gate.wait_for_metadata(JOB_NAME, cancel).await?;

        tracing::info!(job = JOB_NAME, accounts = self.accounts.len(), "Starting job");
        let started = Instant::now();
        let mut summary = CrawlSummary::default();

        for account in self.accounts.iter() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let committed_before = summary.new_records.len();
            let result = match self
                .crawl_account(account, cancel, &mut summary.pages_fetched)
                .await
            {
                Ok(staged) => self.commit(&staged, &mut summary.new_records).await,
                Err(e) => Err(e),
            };
            let added = summary.new_records.len() - committed_before;

            match result {
                Ok(()) => {
                    summary.accounts_processed += 1;
                    tracing::info!(
                        membership_id = account.membership_id,
                        added,
                        "Account crawl committed"
                    );
                }
                Err(e) => {
                    summary.accounts_failed += 1;
                    tracing::error!(
                        membership_id = account.membership_id,
                        added,
                        error = %e,
                        "Account crawl failed, continuing with next account"
                    );
                }
            }
        }

        summary.cancelled |= cancel.is_cancelled();

        tracing::info!(
            job = JOB_NAME,
            elapsed_ms = started.elapsed().as_millis() as u64,
            accounts_processed = summary.accounts_processed,
            accounts_failed = summary.accounts_failed,
            pages = summary.pages_fetched,
            added = summary.new_records.len(),
            cancelled = summary.cancelled,
            "Finished job"
        );

        Ok(summary)
    }

    /// Stage one account's records that are not yet in the store.
    ///
    /// A page fetch failure discards everything staged. On cancellation the
    /// records staged so far are returned for commit.
    async fn crawl_account(
        &self,
        account: &TrackedAccount,
        cancel: &CancellationToken,
        pages_fetched: &mut u32,
    ) -> Result<Vec<ActivityRecord>> {
        let characters = self.source.list_characters(account).await?;
        let character_id = *characters.first().ok_or_else(|| {
            AppError::RemoteData(format!(
                "Account {} has no characters",
                account.membership_id
            ))
        })?;

        tracing::info!(
            membership_id = account.membership_id,
            character_id,
            mode = account.mode.as_str(),
            roster = account.roster,
            "Crawling activity history"
        );

        let mut staged: Vec<ActivityRecord> = Vec::new();
        let mut staged_ids = HashSet::new();
        let mut page = 0u32;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(
                    membership_id = account.membership_id,
                    page,
                    "Cancellation requested, stopping pagination"
                );
                break;
            }

            let occurrences = self
                .source
                .get_activity_page(account, character_id, account.mode, page)
                .await?;
            *pages_fetched += 1;

            if occurrences.is_empty() {
                tracing::debug!(
                    membership_id = account.membership_id,
                    page,
                    "Empty page, history exhausted"
                );
                break;
            }

            let fetched = occurrences.len();
            for occurrence in occurrences {
                // History can shift between requests, so a page may repeat an
                // occurrence already staged from the previous one.
                if staged_ids.contains(&occurrence.instance_id)
                    || self
                        .store
                        .activity_exists(account.membership_id, occurrence.instance_id)
                        .await?
                {
                    continue;
                }
                staged_ids.insert(occurrence.instance_id);
                staged.push(build_record(account, &occurrence));
            }

            tracing::debug!(
                membership_id = account.membership_id,
                page,
                fetched,
                staged = staged.len(),
                "Fetched activity page"
            );
            page += 1;
        }

        Ok(staged)
    }

    /// Write staged records one atomic batch at a time.
    ///
    /// Each batch is appended to `committed` once written, so a failing batch
    /// leaves the earlier ones reported as well as stored.
    async fn commit(
        &self,
        staged: &[ActivityRecord],
        committed: &mut Vec<ActivityRecord>,
    ) -> Result<()> {
        for batch in staged.chunks(MAX_BATCH_WRITES) {
            self.store.insert_activities(batch).await?;
            committed.extend_from_slice(batch);
        }
        Ok(())
    }
}

/// Build the stored form of an occurrence.
pub fn build_record(account: &TrackedAccount, occurrence: &ActivityOccurrence) -> ActivityRecord {
    ActivityRecord {
        membership_id: account.membership_id,
        instance_id: occurrence.instance_id,
        activity_hash: occurrence.activity_hash,
        time: truncate_to_seconds(occurrence.period),
        is_completed: occurrence.is_completed(),
    }
}
