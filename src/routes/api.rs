// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for the map, tracks, statistics and track import.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{MapEntry, MapGroup, MapGroupWithEntries, Track, YearStats};
use crate::services::ingest::Provider;
use crate::services::map::{
    backfill_entry_from_track, build_map_view, compute_map_fingerprint, etag_matches,
    optimize_track_points, relocate_entry, MapView, TrackSummary,
};
use crate::services::normalize::ImportOutcome;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Public read-only routes.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tracks/{id}/points", get(get_track_points))
        .route("/api/stats/{year}", get(get_year_stats))
}

/// Map route; the optional-auth middleware is applied in routes/mod.rs.
pub fn map_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/map", get(get_map))
}

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/activities", get(get_activities))
        .route("/api/diary/{id}/track", post(import_track))
}

/// Track ids referenced by any entry, ascending.
fn referenced_track_ids(groups: &[MapGroupWithEntries]) -> Vec<u64> {
    groups
        .iter()
        .flat_map(|g| g.entries.iter().filter_map(|e| e.track_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ─── Map ─────────────────────────────────────────────────────

/// Overview map with etag revalidation.
async fn get_map(
    State(state): State<Arc<AppState>>,
    viewer: Option<Extension<AuthUser>>,
    headers: HeaderMap,
) -> Result<Response> {
    let mut groups = state.db.list_map_groups_with_entries().await?;
    let tracks = state.db.get_tracks(&referenced_track_ids(&groups)).await?;

    backfill_locations(&mut groups, &tracks)?;

    let viewer_id = viewer.map(|Extension(user)| user.user_id);
    let etag = compute_map_fingerprint(&groups, &tracks, viewer_id)?;

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if etag_matches(if_none_match, &etag) {
        tracing::debug!(etag = %etag, "Map not modified");
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let view: MapView = build_map_view(
        groups,
        &tracks,
        &state.filters,
        state.config.google_maps_browser_key.clone(),
    );

    Ok(([(header::ETAG, etag)], Json(view)).into_response())
}

/// Fill missing locations of legacy entries for this response only.
///
/// Imports persist the backfill, so a read never writes and the stored
/// `updated_at` (and with it the etag) stays put between requests.
fn backfill_locations(groups: &mut [MapGroupWithEntries], tracks: &[Track]) -> Result<()> {
    for entry in groups.iter_mut().flat_map(|g| g.entries.iter_mut()) {
        let track = entry
            .track_id
            .and_then(|id| tracks.iter().find(|t| t.id == id));

        if backfill_entry_from_track(entry, track)? {
            tracing::debug!(map_entry_id = entry.id, city = %entry.city, "Backfilled legacy entry location");
        }
    }
    Ok(())
}

// ─── Tracks ──────────────────────────────────────────────────

/// Thinned point array of one track.
async fn get_track_points(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Response> {
    let track = state
        .db
        .get_track(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Track {}", id)))?;

    let body = optimize_track_points(&track.data)?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

// ─── Statistics ──────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct YearStatsResponse {
    pub year: i32,
    pub track_count: u32,
    /// km
    pub total_distance: f64,
    /// seconds
    pub total_duration: f64,
    pub total_duration_label: String,
    /// km/h, mean of per-track averages
    pub average_speed: f64,
    pub distances: Vec<f64>,
    pub durations: Vec<f64>,
    pub speeds: Vec<f64>,
}

impl YearStatsResponse {
    fn from_stats(stats: YearStats, filters: &crate::services::FilterSet) -> Self {
        let number = |name: &str, values: &[f64]| {
            filters
                .apply(name, &Value::from(values.to_vec()))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0)
        };

        let total_distance = number("sum", &stats.distances);
        let total_duration = number("sum", &stats.durations);
        let average_speed = number("average", &stats.speeds);
        let total_duration_label = filters
            .apply("durationformat", &Value::from(total_duration))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        Self {
            year: stats.year,
            track_count: stats.track_count() as u32,
            total_distance,
            total_duration,
            total_duration_label,
            average_speed,
            distances: stats.distances,
            durations: stats.durations,
            speeds: stats.speeds,
        }
    }
}

async fn get_year_stats(
    State(state): State<Arc<AppState>>,
    Path(year): Path<i32>,
) -> Result<Json<YearStatsResponse>> {
    let (diary, map_entries) = futures_util::try_join!(
        state.db.list_published_diary_entries(),
        state.db.list_map_entries()
    )?;

    let track_ids: Vec<u64> = map_entries
        .iter()
        .filter_map(|e| e.track_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let tracks = state.db.get_tracks(&track_ids).await?;

    let stats = YearStats::collect(year, &diary, &map_entries, &tracks);
    tracing::debug!(year, tracks = stats.track_count(), "Computed year stats");

    Ok(Json(YearStatsResponse::from_stats(stats, &state.filters)))
}

// ─── Provider Activities ─────────────────────────────────────

#[derive(Deserialize)]
struct ActivitiesQuery {
    #[serde(default = "default_provider")]
    provider: Provider,
}

fn default_provider() -> Provider {
    Provider::Strava
}

/// An activity offered for import.
#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivityOption {
    pub provider: String,
    /// Pass back as `activity_id` when importing
    pub activity_id: String,
    pub name: String,
    pub activity_type: String,
    pub start_date: String,
    pub distance_km: f64,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivitiesResponse {
    pub activities: Vec<ActivityOption>,
}

/// Recent provider activities for the import form.
async fn get_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    tracing::debug!(user_id = user.user_id, provider = %params.provider, "Fetching activities");

    let activities = match params.provider {
        Provider::Strava => state
            .strava_service
            .list_activities(&user)
            .await?
            .into_iter()
            .map(|a| ActivityOption {
                provider: Provider::Strava.to_string(),
                activity_id: a.id.to_string(),
                name: a.name,
                activity_type: a.activity_type,
                start_date: format_utc_rfc3339(a.start_date),
                distance_km: crate::units::meters_to_km(a.distance),
            })
            .collect(),
        Provider::Endomondo => endomondo(&state)?
            .subscriptions()
            .await?
            .into_iter()
            .map(|w| ActivityOption {
                provider: Provider::Endomondo.to_string(),
                activity_id: w.activity_id,
                name: w.name,
                activity_type: w.sport.to_string(),
                start_date: format_utc_rfc3339(w.start_time),
                distance_km: w.distance_km,
            })
            .collect(),
    };

    Ok(Json(ActivitiesResponse { activities }))
}

fn endomondo(state: &AppState) -> Result<&crate::services::EndomondoClient> {
    state
        .endomondo
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("Endomondo import is not configured".to_string()))
}

// ─── Track Import ────────────────────────────────────────────

/// Import request body.
#[derive(Debug, Deserialize, Validate)]
pub struct ImportTrackRequest {
    pub provider: Provider,
    #[validate(length(min = 1, max = 64))]
    pub activity_id: String,
    /// Group for a newly created map entry (defaults to the newest group)
    #[serde(default)]
    pub map_group_id: Option<u64>,
    /// Place name override for the map entry
    #[serde(default)]
    #[validate(length(max = 200))]
    pub city: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ImportTrackResponse {
    /// True when the entry already had this activity and nothing changed
    pub unchanged: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub map_entry_id: u64,
    pub track: TrackSummary,
}

/// Attach a provider activity to a diary entry as its track.
async fn import_track(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(diary_id): Path<u64>,
    Json(req): Json<ImportTrackRequest>,
) -> Result<Json<ImportTrackResponse>> {
    req.validate()
        .map_err(|e| AppError::BadRequest(format!("Invalid import request: {}", e)))?;

    let mut diary = state
        .db
        .get_diary_entry(diary_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Diary entry {}", diary_id)))?;

    if !diary.can_edit(user.user_id) {
        tracing::warn!(user_id = user.user_id, diary_id, "Import rejected, not the author");
        return Err(AppError::Forbidden);
    }

    let map_entry = match diary.map_entry_id {
        Some(id) => state.db.get_map_entry(id).await?,
        None => None,
    };
    let existing = match map_entry.as_ref().and_then(|e| e.track_id) {
        Some(id) => state.db.get_track(id).await?,
        None => None,
    };

    let (entry_id, track_id) = allocate_ids(&state, diary.id, map_entry.as_ref()).await?;
    let mut entry = match map_entry {
        Some(entry) => entry,
        None => {
            let groups = state.db.list_map_groups().await?;
            new_map_entry(entry_id, diary.id, choose_map_group(req.map_group_id, &groups)?)
        }
    };

    let outcome = match req.provider {
        Provider::Strava => {
            state
                .importer
                .import(
                    &state.strava_service,
                    &user,
                    track_id,
                    existing.as_ref(),
                    &req.activity_id,
                )
                .await?
        }
        Provider::Endomondo => {
            state
                .importer
                .import(
                    endomondo(&state)?,
                    &user,
                    track_id,
                    existing.as_ref(),
                    &req.activity_id,
                )
                .await?
        }
    };

    if let ImportOutcome::Unchanged(track) = &outcome {
        return Ok(Json(ImportTrackResponse {
            unchanged: true,
            map_entry_id: entry.id,
            track: TrackSummary::from_track(track, &state.filters),
        }));
    }

    let track = outcome.into_track();
    let now = Utc::now();

    entry.track_id = Some(track.id);
    entry.diary_entry_id = Some(diary.id);
    entry.updated_at = now;
    apply_city(&mut entry, req.city, &track);

    if !backfill_entry_from_track(&mut entry, Some(&track))? {
        relocate_entry(state.importer.geocoder(), &mut entry, Some(&track)).await?;
    }

    diary.map_entry_id = Some(entry.id);
    diary.updated_at = now;

    state.db.save_import(&track, &entry, &diary).await?;

    tracing::info!(
        user_id = user.user_id,
        diary_id,
        track_id = track.id,
        provider = %req.provider,
        "Track attached to diary entry"
    );

    Ok(Json(ImportTrackResponse {
        unchanged: false,
        map_entry_id: entry.id,
        track: TrackSummary::from_track(&track, &state.filters),
    }))
}

/// Map entry and track ids for an import.
///
/// Existing links are kept. New records prefer the diary entry's id and
/// move to one past the highest id in use when that one is taken.
async fn allocate_ids(
    state: &AppState,
    diary_id: u64,
    map_entry: Option<&MapEntry>,
) -> Result<(u64, u64)> {
    if let Some(MapEntry { id, track_id: Some(track_id), .. }) = map_entry {
        return Ok((*id, *track_id));
    }

    let entries = state.db.list_map_entries().await?;
    let entry_id = match map_entry {
        Some(entry) => entry.id,
        None => pick_free_id(diary_id, &entries.iter().map(|e| e.id).collect())?,
    };

    let mut taken: BTreeSet<u64> = entries.iter().filter_map(|e| e.track_id).collect();
    let mut track_id = pick_free_id(entry_id, &taken)?;
    // Orphaned tracks hold their id without any entry pointing at them.
    while state.db.get_track(track_id).await?.is_some() {
        taken.insert(track_id);
        track_id = pick_free_id(track_id, &taken)?;
    }

    if entry_id != diary_id || track_id != entry_id {
        tracing::info!(diary_id, entry_id, track_id, "Import ids moved off taken ids");
    }
    Ok((entry_id, track_id))
}

/// `preferred` if free, else one past the highest taken id.
fn pick_free_id(preferred: u64, taken: &BTreeSet<u64>) -> Result<u64> {
    if !taken.contains(&preferred) {
        return Ok(preferred);
    }
    taken
        .last()
        .and_then(|max| max.checked_add(1))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("No free id after {}", preferred)))
}

/// Group for a new map entry: the requested one, else the newest.
fn choose_map_group(requested: Option<u64>, groups: &[MapGroup]) -> Result<u64> {
    match requested {
        Some(id) if groups.iter().any(|g| g.id == id) => Ok(id),
        Some(id) => Err(AppError::BadRequest(format!("Unknown map group {}", id))),
        None => groups
            .iter()
            .map(|g| g.id)
            .max()
            .ok_or_else(|| AppError::BadRequest("No map group to place the entry in".to_string())),
    }
}

/// Set the entry's city from the request.
///
/// A city naming the track's end is cleared so the entry is placed at the
/// last point; any other city is kept for forward geocoding.
fn apply_city(entry: &mut MapEntry, city: Option<String>, track: &Track) {
    if let Some(city) = city {
        entry.city = city;
    }
    if entry.city == track.end_label {
        entry.city.clear();
    }
}

/// Fresh map entry for a diary entry that has none yet.
fn new_map_entry(id: u64, diary_id: u64, map_group_id: u64) -> MapEntry {
    MapEntry {
        id,
        city: String::new(),
        description: String::new(),
        map_group_id,
        lat: 0.0,
        lon: 0.0,
        track_id: None,
        diary_entry_id: Some(diary_id),
        updated_at: Utc::now(),
    }
}
