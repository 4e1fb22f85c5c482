// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::sync::Arc;
use std::time::Duration;
use trail_diary::config::Config;
use trail_diary::db::FirestoreDb;
use trail_diary::routes::create_router;
use trail_diary::services::{
    DescendingCategories, FilterSet, GoogleGeocoder, StravaClient, StravaService, TrackImporter,
};
use trail_diary::AppState;

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

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test JWT the way the OAuth callback does.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: u64, signing_key: &[u8]) -> String {
    trail_diary::middleware::auth::create_jwt(user_id, signing_key)
        .expect("Failed to create JWT")
}

/// Create a test app with offline mock dependencies and no Endomondo
/// account. Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = test_db_offline();

    let strava_service = StravaService::new(
        StravaClient::new(
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        ),
        db.clone(),
        Arc::new(dashmap::DashMap::new()),
    );

    let importer = TrackImporter::new(
        GoogleGeocoder::new(config.google_maps_server_key.clone()),
        DescendingCategories::from_config(&config.descending_activity_types),
        Duration::from_secs(config.import_timeout_secs),
    );

    let state = Arc::new(AppState {
        config,
        db,
        strava_service,
        endomondo: None,
        importer,
        filters: FilterSet::standard(),
    });

    (create_router(state.clone()), state)
}
