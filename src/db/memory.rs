// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store used by tests and by local runs without GCP.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, Player};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    activities: BTreeMap<(i64, i64), ActivityRecord>,
    players: BTreeMap<i64, Player>,
}

/// Mutex-guarded tables with the same uniqueness rules as Firestore.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Database("Memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn activity_exists(&self, membership_id: i64, instance_id: i64) -> Result<bool> {
        Ok(self
            .tables()?
            .activities
            .contains_key(&(membership_id, instance_id)))
    }

    async fn get_activity(
        &self,
        membership_id: i64,
        instance_id: i64,
    ) -> Result<Option<ActivityRecord>> {
        Ok(self
            .tables()?
            .activities
            .get(&(membership_id, instance_id))
            .cloned())
    }

    async fn insert_activities(&self, batch: &[ActivityRecord]) -> Result<()> {
        let mut tables = self.tables()?;

        let mut keys = HashSet::new();
        for record in batch {
            let key = (record.membership_id, record.instance_id);
            if !keys.insert(key) || tables.activities.contains_key(&key) {
                return Err(AppError::Database(format!(
                    "Duplicate activity {}",
                    record.document_id()
                )));
            }
        }

        for record in batch {
            tables
                .activities
                .insert((record.membership_id, record.instance_id), record.clone());
        }
        Ok(())
    }

    async fn list_activities(&self) -> Result<Vec<ActivityRecord>> {
        Ok(self.tables()?.activities.values().cloned().collect())
    }

    async fn player_exists(&self, membership_id: i64) -> Result<bool> {
        Ok(self.tables()?.players.contains_key(&membership_id))
    }

    async fn get_player(&self, membership_id: i64) -> Result<Option<Player>> {
        Ok(self.tables()?.players.get(&membership_id).cloned())
    }

    async fn insert_players(&self, batch: &[Player]) -> Result<()> {
        let mut tables = self.tables()?;

        let mut keys = HashSet::new();
        for player in batch {
            if !keys.insert(player.membership_id)
                || tables.players.contains_key(&player.membership_id)
            {
                return Err(AppError::Database(format!(
                    "Duplicate player {}",
                    player.membership_id
                )));
            }
        }

        for player in batch {
            tables
                .players
                .insert(player.membership_id, player.clone());
        }
        Ok(())
    }

    async fn list_players(&self) -> Result<Vec<Player>> {
        Ok(self.tables()?.players.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(membership_id: i64, instance_id: i64) -> ActivityRecord {
        ActivityRecord {
            membership_id,
            instance_id,
            activity_hash: 1,
            time: Utc::now(),
            is_completed: true,
        }
    }

    #[tokio::test]
    async fn test_duplicate_activity_rejects_whole_batch() {
        let store = MemoryStore::new();
        store.insert_activities(&[record(1, 100)]).await.unwrap();

        let err = store
            .insert_activities(&[record(1, 101), record(1, 100)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        // Nothing from the rejected batch was written
        assert!(!store.activity_exists(1, 101).await.unwrap());
        assert_eq!(store.list_activities().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_instance_for_different_accounts_is_allowed() {
        let store = MemoryStore::new();
        store
            .insert_activities(&[record(1, 100), record(2, 100)])
            .await
            .unwrap();
        assert!(store.activity_exists(2, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_player_within_batch_rejected() {
        let store = MemoryStore::new();
        let err = store
            .insert_players(&[Player::new(5), Player::new(5)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert!(!store.player_exists(5).await.unwrap());
    }
}
