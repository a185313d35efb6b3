// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Jobs talk to the [`Store`] trait; [`FirestoreDb`] backs it in production
//! and [`MemoryStore`] in tests and local dry runs. Both reject a write that
//! would duplicate an activity `(membership_id, instance_id)` pair or a
//! player membership ID.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{ActivityRecord, Player};
use async_trait::async_trait;

/// Largest batch a store writes atomically.
///
/// Firestore caps a transaction at 500 writes; 400 leaves headroom.
pub const MAX_BATCH_WRITES: usize = 400;

/// Collection names as constants.
pub mod collections {
    pub const ACTIVITIES: &str = "activities";
    pub const PLAYERS: &str = "players";
}

/// Keyed insert/query capability over activity records and players.
#[async_trait]
pub trait Store: Send + Sync {
    async fn activity_exists(&self, membership_id: i64, instance_id: i64) -> Result<bool>;

    async fn get_activity(
        &self,
        membership_id: i64,
        instance_id: i64,
    ) -> Result<Option<ActivityRecord>>;

    /// Insert new records, rejecting any duplicate key.
    ///
    /// A batch of at most [`MAX_BATCH_WRITES`] is all-or-nothing. Larger
    /// batches are split, and a failed chunk leaves earlier chunks written.
    async fn insert_activities(&self, batch: &[ActivityRecord]) -> Result<()>;

    async fn list_activities(&self) -> Result<Vec<ActivityRecord>>;

    async fn player_exists(&self, membership_id: i64) -> Result<bool>;

    async fn get_player(&self, membership_id: i64) -> Result<Option<Player>>;

    /// Insert new players; same atomicity as [`Store::insert_activities`].
    async fn insert_players(&self, batch: &[Player]) -> Result<()>;

    async fn list_players(&self) -> Result<Vec<Player>>;
}
