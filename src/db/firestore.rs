// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users and provider tokens
//! - Diary entries
//! - Map groups and entries
//! - Tracks

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    DiaryEntry, MapEntry, MapGroup, MapGroupWithEntries, ProviderTokens, Track, User,
};
use futures_util::{stream, StreamExt};
use std::collections::HashMap;

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator takes an unauthenticated connection.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
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

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn get_doc<T>(&self, collection: &str, id: u64) -> Result<Option<T>, AppError>
    where
        T: for<'de> serde::Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn put_doc<T>(&self, collection: &str, id: u64, doc: &T) -> Result<(), AppError>
    where
        T: serde::Serialize + for<'de> serde::Deserialize<'de> + Send + Sync,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id.to_string())
            .object(doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_docs<T>(&self, collection: &str) -> Result<Vec<T>, AppError>
    where
        T: for<'de> serde::Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by their Strava athlete ID.
    pub async fn get_user(&self, athlete_id: u64) -> Result<Option<User>, AppError> {
        self.get_doc(collections::USERS, athlete_id).await
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.put_doc(collections::USERS, user.strava_athlete_id, user)
            .await
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Get provider tokens for a user.
    pub async fn get_tokens(&self, user_id: u64) -> Result<Option<ProviderTokens>, AppError> {
        self.get_doc(collections::TOKENS, user_id).await
    }

    /// Store provider tokens for a user.
    pub async fn set_tokens(&self, user_id: u64, tokens: &ProviderTokens) -> Result<(), AppError> {
        self.put_doc(collections::TOKENS, user_id, tokens).await
    }

    // ─── Diary Operations ────────────────────────────────────────

    pub async fn get_diary_entry(&self, id: u64) -> Result<Option<DiaryEntry>, AppError> {
        self.get_doc(collections::DIARY_ENTRIES, id).await
    }

    pub async fn upsert_diary_entry(&self, entry: &DiaryEntry) -> Result<(), AppError> {
        self.put_doc(collections::DIARY_ENTRIES, entry.id, entry)
            .await
    }

    /// All published diary entries.
    pub async fn list_published_diary_entries(&self) -> Result<Vec<DiaryEntry>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::DIARY_ENTRIES)
            .filter(|q| q.for_all([q.field("published").eq(true)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Map Operations ──────────────────────────────────────────

    pub async fn list_map_groups(&self) -> Result<Vec<MapGroup>, AppError> {
        self.list_docs(collections::MAP_GROUPS).await
    }

    pub async fn upsert_map_group(&self, group: &MapGroup) -> Result<(), AppError> {
        self.put_doc(collections::MAP_GROUPS, group.id, group).await
    }

    pub async fn list_map_entries(&self) -> Result<Vec<MapEntry>, AppError> {
        self.list_docs(collections::MAP_ENTRIES).await
    }

    pub async fn get_map_entry(&self, id: u64) -> Result<Option<MapEntry>, AppError> {
        self.get_doc(collections::MAP_ENTRIES, id).await
    }

    pub async fn upsert_map_entry(&self, entry: &MapEntry) -> Result<(), AppError> {
        self.put_doc(collections::MAP_ENTRIES, entry.id, entry)
            .await
    }

    /// Groups with their entries attached. Entries pointing at a missing
    /// group are dropped.
    pub async fn list_map_groups_with_entries(
        &self,
    ) -> Result<Vec<MapGroupWithEntries>, AppError> {
        let (groups, entries) =
            futures_util::try_join!(self.list_map_groups(), self.list_map_entries())?;

        let mut by_group: HashMap<u64, Vec<MapEntry>> = HashMap::new();
        for entry in entries {
            by_group.entry(entry.map_group_id).or_default().push(entry);
        }

        Ok(groups
            .into_iter()
            .map(|group| {
                let entries = by_group.remove(&group.id).unwrap_or_default();
                MapGroupWithEntries { group, entries }
            })
            .collect())
    }

    // ─── Track Operations ────────────────────────────────────────

    pub async fn get_track(&self, id: u64) -> Result<Option<Track>, AppError> {
        self.get_doc(collections::TRACKS, id).await
    }

    pub async fn upsert_track(&self, track: &Track) -> Result<(), AppError> {
        self.put_doc(collections::TRACKS, track.id, track).await
    }

    /// Fetch tracks by id concurrently; missing ids are skipped.
    pub async fn get_tracks(&self, ids: &[u64]) -> Result<Vec<Track>, AppError> {
        let results = stream::iter(ids.to_vec())
            .map(|id| async move { self.get_track(id).await })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Option<Track>, AppError>>>()
            .await;

        let mut tracks = Vec::with_capacity(results.len());
        for result in results {
            if let Some(track) = result? {
                tracks.push(track);
            }
        }
        tracks.sort_by_key(|t| t.id);
        Ok(tracks)
    }

    // ─── Atomic Import ───────────────────────────────────────────

    /// Persist an imported track with its map entry and diary entry.
    ///
    /// The writes are queued in the order track, map entry, diary entry and
    /// committed in one transaction so a failure leaves nothing behind.
    pub async fn save_import(
        &self,
        track: &Track,
        map_entry: &MapEntry,
        diary_entry: &DiaryEntry,
    ) -> Result<(), AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::TRACKS)
            .document_id(track.id.to_string())
            .object(track)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add track to transaction: {}", e))
            })?;

        client
            .fluent()
            .update()
            .in_col(collections::MAP_ENTRIES)
            .document_id(map_entry.id.to_string())
            .object(map_entry)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add map entry to transaction: {}", e))
            })?;

        client
            .fluent()
            .update()
            .in_col(collections::DIARY_ENTRIES)
            .document_id(diary_entry.id.to_string())
            .object(diary_entry)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add diary entry to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            track_id = track.id,
            map_entry_id = map_entry.id,
            diary_entry_id = diary_entry.id,
            "Import persisted"
        );

        Ok(())
    }
}
