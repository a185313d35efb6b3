// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use waterfall::config::{Config, PAGE_SIZE};
use waterfall::db::{FirestoreDb, MemoryStore, Store};
use waterfall::error::{AppError, Result};
use waterfall::models::{
    ActivityMode, ActivityOccurrence, ActivityRecord, Clan, DetailReport, Player, ReportEntry,
    TrackedAccount, WeaponUsage,
};
use waterfall::routes::create_router;
use waterfall::services::{ActivitySource, Notification, NotificationSink, ReadinessGate};
use waterfall::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ═══════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════

#[allow(dead_code)]
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn account(membership_id: i64, mode: ActivityMode) -> TrackedAccount {
    TrackedAccount {
        membership_id,
        membership_type: 3,
        descriptor: 4108,
        mode,
        roster: false,
    }
}

/// An occurrence with sub-second precision on its period.
#[allow(dead_code)]
pub fn occurrence(instance_id: i64, completed: &str, reason: &str) -> ActivityOccurrence {
    ActivityOccurrence {
        instance_id,
        activity_hash: 1_374_392_663,
        period: base_time()
            + ChronoDuration::seconds(instance_id)
            + ChronoDuration::milliseconds(250),
        completed: completed.to_string(),
        completion_reason: reason.to_string(),
    }
}

/// `count` completed occurrences with instance IDs starting at `first_id`.
#[allow(dead_code)]
pub fn history(first_id: i64, count: usize) -> Vec<ActivityOccurrence> {
    (0..count as i64)
        .map(|i| occurrence(first_id + i, "Yes", "Objective Completed"))
        .collect()
}

#[allow(dead_code)]
pub fn record(membership_id: i64, instance_id: i64) -> ActivityRecord {
    ActivityRecord {
        membership_id,
        instance_id,
        activity_hash: 1_374_392_663,
        time: base_time(),
        is_completed: true,
    }
}

#[allow(dead_code)]
pub fn entry(membership_id: i64, kills: f64, deaths: f64) -> ReportEntry {
    ReportEntry {
        membership_id,
        membership_type: 3,
        display_name: Some(format!("Report{}", membership_id)),
        kills,
        deaths,
        completed: "Yes".to_string(),
        weapons: vec![WeaponUsage {
            item_hash: 3_211_806_999,
            unique_kills: kills,
        }],
    }
}

#[allow(dead_code)]
pub fn report(instance_id: i64, entries: Vec<ReportEntry>) -> DetailReport {
    DetailReport {
        instance_id,
        activity_hash: 1_374_392_663,
        mode: Some(ActivityMode::Raid),
        period: base_time(),
        entries,
    }
}

/// A gate with metadata already loaded and a short poll interval.
#[allow(dead_code)]
pub fn ready_gate() -> Arc<ReadinessGate> {
    let gate = Arc::new(ReadinessGate::with_poll_interval(Duration::from_millis(10)));
    gate.mark_metadata_ready();
    gate
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE ACTIVITY SOURCE
// ═══════════════════════════════════════════════════════════════════════════

/// Scriptable in-process `ActivitySource`.
///
/// Each account's history is one list served in `PAGE_SIZE` pages; every
/// account has a single character with ID 1 unless it is set to fail.
#[derive(Default)]
pub struct FakeSource {
    histories: Mutex<HashMap<i64, Vec<ActivityOccurrence>>>,
    reports: Mutex<HashMap<i64, DetailReport>>,
    failing_accounts: Mutex<HashSet<i64>>,
    failing_reports: Mutex<HashSet<i64>>,
    throttled_reports: Mutex<HashSet<i64>>,
    failing_lookups: Mutex<bool>,
    metadata_failures: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    pub page_requests: AtomicUsize,
    pub report_requests: AtomicUsize,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_history(&self, membership_id: i64, occurrences: Vec<ActivityOccurrence>) {
        self.histories
            .lock()
            .unwrap()
            .insert(membership_id, occurrences);
    }

    pub fn add_report(&self, report: DetailReport) {
        self.reports
            .lock()
            .unwrap()
            .insert(report.instance_id, report);
    }

    /// Character lookup for this account fails.
    pub fn fail_account(&self, membership_id: i64) {
        self.failing_accounts.lock().unwrap().insert(membership_id);
    }

    pub fn fail_report(&self, instance_id: i64) {
        self.failing_reports.lock().unwrap().insert(instance_id);
    }

    /// Report fetch is refused as throttled.
    pub fn throttle_report(&self, instance_id: i64) {
        self.throttled_reports.lock().unwrap().insert(instance_id);
    }

    /// Identity, clan and item lookups fail.
    pub fn fail_lookups(&self) {
        *self.failing_lookups.lock().unwrap() = true;
    }

    /// The first `n` metadata loads fail.
    pub fn fail_metadata(&self, n: usize) {
        self.metadata_failures.store(n, Ordering::SeqCst);
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    pub fn report_requests(&self) -> usize {
        self.report_requests.load(Ordering::SeqCst)
    }

    fn lookups_fail(&self) -> bool {
        *self.failing_lookups.lock().unwrap()
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    async fn load_metadata(&self) -> Result<String> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.metadata_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.metadata_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Remote("Manifest unavailable".to_string()));
        }
        Ok("fake-manifest".to_string())
    }

    async fn list_characters(&self, account: &TrackedAccount) -> Result<Vec<i64>> {
        if self
            .failing_accounts
            .lock()
            .unwrap()
            .contains(&account.membership_id)
        {
            return Err(AppError::Remote("HTTP 500".to_string()));
        }
        Ok(vec![1])
    }

    async fn get_activity_page(
        &self,
        account: &TrackedAccount,
        _character_id: i64,
        _mode: ActivityMode,
        page: u32,
    ) -> Result<Vec<ActivityOccurrence>> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);

        let histories = self.histories.lock().unwrap();
        let all = histories
            .get(&account.membership_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let start = (page * PAGE_SIZE) as usize;
        let end = (start + PAGE_SIZE as usize).min(all.len());

        Ok(if start >= all.len() {
            Vec::new()
        } else {
            all[start..end].to_vec()
        })
    }

    async fn get_detail_report(&self, instance_id: i64) -> Result<DetailReport> {
        self.report_requests.fetch_add(1, Ordering::SeqCst);

        if self.failing_reports.lock().unwrap().contains(&instance_id) {
            return Err(AppError::Remote("HTTP 503".to_string()));
        }
        if self.throttled_reports.lock().unwrap().contains(&instance_id) {
            return Err(AppError::Remote(AppError::REMOTE_RATE_LIMIT.to_string()));
        }
        self.reports
            .lock()
            .unwrap()
            .get(&instance_id)
            .cloned()
            .ok_or_else(|| AppError::RemoteData(format!("No report for {}", instance_id)))
    }

    async fn resolve_identity(&self, membership_id: i64) -> Result<String> {
        if self.lookups_fail() {
            return Err(AppError::Remote("HTTP 500".to_string()));
        }
        Ok(format!("Guardian{}#0042", membership_id))
    }

    async fn resolve_clans(&self, _membership_type: i32, membership_id: i64) -> Result<Vec<Clan>> {
        if self.lookups_fail() {
            return Err(AppError::Remote("HTTP 500".to_string()));
        }
        Ok(vec![Clan {
            group_id: 881267,
            name: format!("Clan of {}", membership_id),
            call_sign: "MOON".to_string(),
        }])
    }

    async fn resolve_item(&self, item_hash: u32) -> Result<String> {
        if self.lookups_fail() {
            return Err(AppError::Remote("HTTP 500".to_string()));
        }
        Ok(format!("Weapon {}", item_hash))
    }

    async fn resolve_activity(&self, activity_hash: u32) -> Result<String> {
        Ok(format!("Activity {}", activity_hash))
    }
}

/// Wraps [`FakeSource`] so detail report fetches take `delay` and overlap.
///
/// Tracks the peak number of fetches in flight. With `cancel_after` set, the
/// token is cancelled once that many fetches have started.
pub struct SlowSource {
    pub inner: FakeSource,
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    started: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

#[allow(dead_code)]
impl SlowSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: FakeSource::new(),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    pub fn cancelling_after(mut self, fetches: usize, cancel: CancellationToken) -> Self {
        self.cancel_after = Some((fetches, cancel));
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivitySource for SlowSource {
    async fn load_metadata(&self) -> Result<String> {
        self.inner.load_metadata().await
    }

    async fn list_characters(&self, account: &TrackedAccount) -> Result<Vec<i64>> {
        self.inner.list_characters(account).await
    }

    async fn get_activity_page(
        &self,
        account: &TrackedAccount,
        character_id: i64,
        mode: ActivityMode,
        page: u32,
    ) -> Result<Vec<ActivityOccurrence>> {
        self.inner
            .get_activity_page(account, character_id, mode, page)
            .await
    }

    async fn get_detail_report(&self, instance_id: i64) -> Result<DetailReport> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let started = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, cancel)) = &self.cancel_after {
            if started >= *after {
                cancel.cancel();
            }
        }

        tokio::time::sleep(self.delay).await;
        let result = self.inner.get_detail_report(instance_id).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn resolve_identity(&self, membership_id: i64) -> Result<String> {
        self.inner.resolve_identity(membership_id).await
    }

    async fn resolve_clans(&self, membership_type: i32, membership_id: i64) -> Result<Vec<Clan>> {
        self.inner.resolve_clans(membership_type, membership_id).await
    }

    async fn resolve_item(&self, item_hash: u32) -> Result<String> {
        self.inner.resolve_item(item_hash).await
    }

    async fn resolve_activity(&self, activity_hash: u32) -> Result<String> {
        self.inner.resolve_activity(activity_hash).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SINKS AND STORES
// ═══════════════════════════════════════════════════════════════════════════

/// Sink that keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the notification, then reports a delivery failure.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            anyhow::bail!("webhook unreachable");
        }
        Ok(())
    }
}

/// Memory store whose player inserts start failing after `ok_inserts` calls.
pub struct FlakyStore {
    pub inner: MemoryStore,
    ok_inserts: usize,
    ok_activity_inserts: usize,
    player_inserts: AtomicUsize,
    activity_inserts: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(ok_inserts: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            ok_inserts,
            ok_activity_inserts: usize::MAX,
            player_inserts: AtomicUsize::new(0),
            activity_inserts: AtomicUsize::new(0),
        }
    }

    /// Player inserts always succeed; activity inserts fail after `ok` calls.
    pub fn failing_activities_after(ok: usize) -> Self {
        Self {
            ok_activity_inserts: ok,
            ..Self::new(usize::MAX)
        }
    }

    pub fn player_inserts(&self) -> usize {
        self.player_inserts.load(Ordering::SeqCst)
    }

    pub fn activity_inserts(&self) -> usize {
        self.activity_inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn activity_exists(&self, membership_id: i64, instance_id: i64) -> Result<bool> {
        self.inner.activity_exists(membership_id, instance_id).await
    }

    async fn get_activity(
        &self,
        membership_id: i64,
        instance_id: i64,
    ) -> Result<Option<ActivityRecord>> {
        self.inner.get_activity(membership_id, instance_id).await
    }

    async fn insert_activities(&self, batch: &[ActivityRecord]) -> Result<()> {
        let call = self.activity_inserts.fetch_add(1, Ordering::SeqCst);
        if call >= self.ok_activity_inserts {
            return Err(AppError::Database("Commit failed".to_string()));
        }
        self.inner.insert_activities(batch).await
    }

    async fn list_activities(&self) -> Result<Vec<ActivityRecord>> {
        self.inner.list_activities().await
    }

    async fn player_exists(&self, membership_id: i64) -> Result<bool> {
        self.inner.player_exists(membership_id).await
    }

    async fn get_player(&self, membership_id: i64) -> Result<Option<Player>> {
        self.inner.get_player(membership_id).await
    }

    async fn insert_players(&self, batch: &[Player]) -> Result<()> {
        let call = self.player_inserts.fetch_add(1, Ordering::SeqCst);
        if call >= self.ok_inserts {
            return Err(AppError::Database("Commit failed".to_string()));
        }
        self.inner.insert_players(batch).await
    }

    async fn list_players(&self) -> Result<Vec<Player>> {
        self.inner.list_players().await
    }
}

/// Memory store where another writer adds `late_player` right after the
/// player snapshot is taken.
pub struct LateWriterStore {
    pub inner: MemoryStore,
    late_player: i64,
}

#[allow(dead_code)]
impl LateWriterStore {
    pub fn new(late_player: i64) -> Self {
        Self {
            inner: MemoryStore::new(),
            late_player,
        }
    }
}

#[async_trait]
impl Store for LateWriterStore {
    async fn activity_exists(&self, membership_id: i64, instance_id: i64) -> Result<bool> {
        self.inner.activity_exists(membership_id, instance_id).await
    }

    async fn get_activity(
        &self,
        membership_id: i64,
        instance_id: i64,
    ) -> Result<Option<ActivityRecord>> {
        self.inner.get_activity(membership_id, instance_id).await
    }

    async fn insert_activities(&self, batch: &[ActivityRecord]) -> Result<()> {
        self.inner.insert_activities(batch).await
    }

    async fn list_activities(&self) -> Result<Vec<ActivityRecord>> {
        self.inner.list_activities().await
    }

    async fn player_exists(&self, membership_id: i64) -> Result<bool> {
        self.inner.player_exists(membership_id).await
    }

    async fn get_player(&self, membership_id: i64) -> Result<Option<Player>> {
        self.inner.get_player(membership_id).await
    }

    async fn insert_players(&self, batch: &[Player]) -> Result<()> {
        self.inner.insert_players(batch).await
    }

    async fn list_players(&self) -> Result<Vec<Player>> {
        let snapshot = self.inner.list_players().await?;
        if !self.inner.player_exists(self.late_player).await? {
            self.inner
                .insert_players(&[Player::new(self.late_player)])
                .await?;
        }
        Ok(snapshot)
    }
}

/// Memory store whose player lookups always miss and whose player inserts
/// write the rows, then report a failed commit.
///
/// This is what a caller sees when another writer creates the same player
/// between its lookup and its insert.
#[derive(Default)]
pub struct RacingPlayerStore {
    pub inner: MemoryStore,
}

#[allow(dead_code)]
impl RacingPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for RacingPlayerStore {
    async fn activity_exists(&self, membership_id: i64, instance_id: i64) -> Result<bool> {
        self.inner.activity_exists(membership_id, instance_id).await
    }

    async fn get_activity(
        &self,
        membership_id: i64,
        instance_id: i64,
    ) -> Result<Option<ActivityRecord>> {
        self.inner.get_activity(membership_id, instance_id).await
    }

    async fn insert_activities(&self, batch: &[ActivityRecord]) -> Result<()> {
        self.inner.insert_activities(batch).await
    }

    async fn list_activities(&self) -> Result<Vec<ActivityRecord>> {
        self.inner.list_activities().await
    }

    async fn player_exists(&self, membership_id: i64) -> Result<bool> {
        self.inner.player_exists(membership_id).await
    }

    async fn get_player(&self, _membership_id: i64) -> Result<Option<Player>> {
        Ok(None)
    }

    async fn insert_players(&self, batch: &[Player]) -> Result<()> {
        for player in batch {
            if !self.inner.player_exists(player.membership_id).await? {
                self.inner.insert_players(&[player.clone()]).await?;
            }
        }
        Err(AppError::Database("Document already exists".to_string()))
    }

    async fn list_players(&self) -> Result<Vec<Player>> {
        self.inner.list_players().await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// APP
// ═══════════════════════════════════════════════════════════════════════════

/// Capabilities behind a test app, kept so tests can script and inspect them.
#[allow(dead_code)]
pub struct TestHarness {
    pub source: Arc<FakeSource>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub state: Arc<AppState>,
}

/// Build app state over fakes for the given accounts.
#[allow(dead_code)]
pub fn test_harness(config: Config, accounts: Vec<TrackedAccount>) -> TestHarness {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::new());

    let state = Arc::new(AppState::new(
        config,
        accounts,
        store.clone(),
        source.clone(),
        sink.clone(),
    ));

    TestHarness {
        source,
        store,
        sink,
        state,
    }
}

/// Create a test app with fake dependencies.
/// Returns the router and the harness.
#[allow(dead_code)]
pub fn create_test_app(accounts: Vec<TrackedAccount>) -> (axum::Router, TestHarness) {
    let harness = test_harness(Config::test_default(), accounts);
    (create_router(harness.state.clone()), harness)
}
