// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trail Diary: GPS tracks for a travel and hiking diary
//!
//! This crate provides the backend API that imports Strava and Endomondo
//! activities as diary tracks and renders them on the overview map.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;
pub mod units;

use config::Config;
use db::FirestoreDb;
use services::{EndomondoClient, FilterSet, GoogleGeocoder, StravaService, TrackImporter};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub strava_service: StravaService,
    /// Present only when Endomondo credentials are configured
    pub endomondo: Option<EndomondoClient>,
    pub importer: TrackImporter<GoogleGeocoder>,
    pub filters: FilterSet,
}
