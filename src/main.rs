// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trail Diary API Server
//!
//! Imports GPS tracks from Strava and Endomondo into diary entries and
//! serves the overview map.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trail_diary::{
    config::Config,
    db::FirestoreDb,
    services::{
        DescendingCategories, EndomondoClient, FilterSet, GoogleGeocoder, StravaClient,
        StravaService, TrackImporter,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured JSON logging for GCP
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Trail Diary API");

    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    // Refresh locks are shared by every request on this instance.
    let refresh_locks = Arc::new(dashmap::DashMap::new());
    let strava_service = StravaService::new(
        StravaClient::new(
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        ),
        db.clone(),
        refresh_locks,
    );

    let endomondo = match config.endomondo_credentials() {
        Some((email, password)) => {
            tracing::info!("Endomondo import enabled");
            Some(EndomondoClient::new(
                email.to_string(),
                password.to_string(),
            )?)
        }
        None => {
            tracing::info!("Endomondo credentials not set, Endomondo import disabled");
            None
        }
    };

    let categories = DescendingCategories::from_config(&config.descending_activity_types);
    tracing::info!(
        categories = ?config.descending_activity_types,
        timeout_secs = config.import_timeout_secs,
        "Track importer configured"
    );
    let importer = TrackImporter::new(
        GoogleGeocoder::new(config.google_maps_server_key.clone()),
        categories,
        Duration::from_secs(config.import_timeout_secs),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        strava_service,
        endomondo,
        importer,
        filters: FilterSet::standard(),
    });

    let app = trail_diary::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trail_diary=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
