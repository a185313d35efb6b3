// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Activities (crawled activity history, keyed `{membership_id}_{instance_id}`)
//! - Players (participants, keyed by membership ID)

use crate::db::{collections, Store, MAX_BATCH_WRITES};
use crate::error::{AppError, Result};
use crate::models::activity::document_id;
use crate::models::{ActivityRecord, Player};
use async_trait::async_trait;
use firestore::FirestoreWritePrecondition;
use serde::{Deserialize, Serialize};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    /// Create documents in transactions of at most [`MAX_BATCH_WRITES`].
    ///
    /// Every write carries an `Exists(false)` precondition, so a document that
    /// already exists fails the commit of its chunk and nothing in that chunk
    /// is written. Chunks committed before a failing one stay committed.
    async fn batch_create<T, F>(&self, items: &[T], collection: &str, id_extractor: F) -> Result<()>
    where
        T: Serialize + for<'de> Deserialize<'de> + Sync + Send,
        F: Fn(&T) -> String,
    {
        let client = &self.client;

        for chunk in items.chunks(MAX_BATCH_WRITES) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .precondition(FirestoreWritePrecondition::Exists(false))
                    .document_id(&doc_id)
                    .object(item)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add {} document {} to transaction: {}",
                            collection, doc_id, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit {} batch: {}", collection, e))
            })?;

            tracing::debug!(collection, count = chunk.len(), "Committed batch");
        }

        Ok(())
    }
}

#[async_trait]
impl Store for FirestoreDb {
    // ─── Activity Operations ─────────────────────────────────────

    async fn activity_exists(&self, membership_id: i64, instance_id: i64) -> Result<bool> {
        Ok(self.get_activity(membership_id, instance_id).await?.is_some())
    }

    async fn get_activity(
        &self,
        membership_id: i64,
        instance_id: i64,
    ) -> Result<Option<ActivityRecord>> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(&document_id(membership_id, instance_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn insert_activities(&self, batch: &[ActivityRecord]) -> Result<()> {
        self.batch_create(batch, collections::ACTIVITIES, |record: &ActivityRecord| {
            record.document_id()
        })
        .await
    }

    async fn list_activities(&self) -> Result<Vec<ActivityRecord>> {
        self.client
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Player Operations ───────────────────────────────────────

    async fn player_exists(&self, membership_id: i64) -> Result<bool> {
        Ok(self.get_player(membership_id).await?.is_some())
    }

    async fn get_player(&self, membership_id: i64) -> Result<Option<Player>> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::PLAYERS)
            .obj()
            .one(&membership_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn insert_players(&self, batch: &[Player]) -> Result<()> {
        self.batch_create(batch, collections::PLAYERS, |player: &Player| {
            player.membership_id.to_string()
        })
        .await
    }

    async fn list_players(&self) -> Result<Vec<Player>> {
        self.client
            .fluent()
            .select()
            .from(collections::PLAYERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
