// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Overview map rendering.
//!
//! - Adaptive polyline simplification for static map URLs
//! - Content fingerprint (etag) over groups, entries and tracks
//! - Point thinning for the per-track point stream
//! - Lazy backfill of entry location from its track

use crate::error::AppError;
use crate::models::track::{decode_points, encode_points};
use crate::models::{MapEntry, MapGroupWithEntries, Track, TrackPoint};
use crate::services::filters::FilterSet;
use crate::services::geocode::Geocoder;
use crate::time_utils::unix_nanos;
use chrono::{DateTime, Utc};
use geo::Coord;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Budget for the percent-encoded polyline embedded in a static map URL.
pub const MAX_ENCODED_POLYLINE_LEN: usize = 1800;

/// Minimum distance gain (km) between kept points when thinning.
pub const THINNING_EPSILON_KM: f64 = 0.01;

const POLYLINE_PRECISION: u32 = 5;

/// A percent-encoded polyline and the sampling stride that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPolyline {
    pub value: String,
    pub stride: usize,
}

/// Encode `points` as a polyline no longer than `max_len` once
/// percent-encoded.
///
/// Samples every `stride`-th point starting at index 0, doubling the
/// stride until the encoding fits. The last point is only included when it
/// falls on the stride.
pub fn encode_polyline(points: &[TrackPoint], max_len: usize) -> Result<EncodedPolyline, AppError> {
    if points.is_empty() {
        return Ok(EncodedPolyline {
            value: String::new(),
            stride: 1,
        });
    }

    let mut stride = 1usize;
    loop {
        let coords = points.iter().step_by(stride).map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        });
        let encoded = polyline::encode_coordinates(coords, POLYLINE_PRECISION)
            .map_err(|e| AppError::Polyline(e.to_string()))?;
        let value = urlencoding::encode(&encoded).into_owned();

        if value.len() <= max_len {
            return Ok(EncodedPolyline { value, stride });
        }

        if stride >= points.len() {
            return Err(AppError::Polyline(format!(
                "single point encodes to {} bytes, budget {}",
                value.len(),
                max_len
            )));
        }

        stride *= 2;
    }
}

/// Fingerprint of everything the overview map shows.
///
/// Hashes big-endian u64 values: the viewer id (when signed in), then each
/// group by descending id as `(id, updated_at ns)` followed by its entries by
/// ascending id, then every referenced track by ascending id. Tracks missing
/// from `tracks` are skipped.
pub fn compute_map_fingerprint(
    groups: &[MapGroupWithEntries],
    tracks: &[Track],
    viewer_id: Option<u64>,
) -> Result<String, AppError> {
    let mut hasher = Sha256::new();
    let mut write = |value: u64| hasher.update(value.to_be_bytes());

    if let Some(id) = viewer_id {
        write(id);
    }

    let mut ordered: Vec<&MapGroupWithEntries> = groups.iter().collect();
    ordered.sort_by(|a, b| b.group.id.cmp(&a.group.id));

    let mut track_ids = BTreeSet::new();
    for group in ordered {
        write(group.group.id);
        write(nanos(group.group.updated_at)?);

        let mut entries: Vec<&MapEntry> = group.entries.iter().collect();
        entries.sort_by_key(|e| e.id);
        for entry in entries {
            write(entry.id);
            write(nanos(entry.updated_at)?);
            if let Some(track_id) = entry.track_id {
                track_ids.insert(track_id);
            }
        }
    }

    let tracks_by_id: HashMap<u64, &Track> = tracks.iter().map(|t| (t.id, t)).collect();
    for id in track_ids {
        if let Some(track) = tracks_by_id.get(&id) {
            write(track.id);
            write(nanos(track.updated_at)?);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

fn nanos(date: DateTime<Utc>) -> Result<u64, AppError> {
    unix_nanos(date).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("timestamp {} out of etag range", date))
    })
}

/// Whether an `If-None-Match` header value covers `etag`.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    !if_none_match.is_empty() && if_none_match.contains(etag)
}

/// Thin a stored point array for display.
///
/// Keeps the first point, then every point whose cumulative distance exceeds
/// the last kept one by more than [`THINNING_EPSILON_KM`]. Legacy records
/// (string-typed numbers, `time.Time` key) are accepted; the output uses the
/// current format.
pub fn optimize_track_points(raw: &str) -> Result<String, AppError> {
    let points = decode_points(raw)?;
    let before = points.len();
    let thinned = thin_points(points);

    tracing::debug!(before, after = thinned.len(), "Thinned track points");

    encode_points(&thinned)
}

fn thin_points(points: Vec<TrackPoint>) -> Vec<TrackPoint> {
    let mut kept: Vec<TrackPoint> = Vec::with_capacity(points.len());
    for point in points {
        match kept.last() {
            Some(last) if point.distance - last.distance <= THINNING_EPSILON_KM => {}
            _ => kept.push(point),
        }
    }
    kept
}

/// Fill an entry's location from its track's last point.
///
/// Applies only while the entry has no city and the track has points and
/// an end label. Returns whether the entry changed.
pub fn backfill_entry_from_track(
    entry: &mut MapEntry,
    track: Option<&Track>,
) -> Result<bool, AppError> {
    let Some(track) = track else {
        return Ok(false);
    };
    if !entry.city.is_empty() || track.end_label.is_empty() || track.data.is_empty() {
        return Ok(false);
    }

    let points = track.points()?;
    let Some(last) = points.last() else {
        return Ok(false);
    };

    entry.lat = last.latitude;
    entry.lon = last.longitude;
    entry.city = track.end_label.clone();
    Ok(true)
}

/// Move an entry to the coordinates of its city when the city was edited
/// away from the track's end label.
pub async fn relocate_entry<G: Geocoder>(
    geocoder: &G,
    entry: &mut MapEntry,
    track: Option<&Track>,
) -> Result<bool, AppError> {
    if entry.city.is_empty() {
        return Ok(false);
    }
    if track.is_some_and(|t| t.end_label == entry.city) {
        return Ok(false);
    }

    let (lat, lon) = geocoder.forward(&entry.city).await?;
    entry.lat = lat;
    entry.lon = lon;
    Ok(true)
}

// ─── View payload ───────────────────────────────────────────

/// Overview map payload.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MapView {
    pub groups: Vec<MapGroupView>,
    pub tracks: Vec<TrackSummary>,
    pub browser_key: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MapGroupView {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    pub color: String,
    pub entries: Vec<MapEntryView>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MapEntryView {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub city: String,
    pub description: String,
    pub lat: f64,
    pub lon: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub track_id: Option<u64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub diary_entry_id: Option<u64>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrackSummary {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub start_label: String,
    pub end_label: String,
    pub date: String,
    pub length: f64,
    pub duration: f64,
    /// e.g. `"2 h 5 min"`
    pub duration_label: String,
    pub avg_speed: f64,
    pub map_url: String,
}

impl TrackSummary {
    pub fn from_track(track: &Track, filters: &FilterSet) -> Self {
        let duration_label = filters
            .apply("durationformat", &serde_json::Value::from(track.duration))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        Self {
            id: track.id,
            start_label: track.start_label.clone(),
            end_label: track.end_label.clone(),
            date: crate::time_utils::format_utc_rfc3339(track.date),
            length: track.length,
            duration: track.duration,
            duration_label,
            avg_speed: track.avg_speed,
            map_url: track.map_url.clone(),
        }
    }
}

/// Build the map payload. Groups without entries are left out; groups keep
/// descending id order and entries ascending.
pub fn build_map_view(
    groups: Vec<MapGroupWithEntries>,
    tracks: &[Track],
    filters: &FilterSet,
    browser_key: String,
) -> MapView {
    let mut groups: Vec<MapGroupWithEntries> =
        groups.into_iter().filter(|g| !g.entries.is_empty()).collect();
    groups.sort_by(|a, b| b.group.id.cmp(&a.group.id));

    let groups = groups
        .into_iter()
        .map(|g| {
            let mut entries: Vec<MapEntryView> = g
                .entries
                .into_iter()
                .map(|e| MapEntryView {
                    id: e.id,
                    city: e.city,
                    description: e.description,
                    lat: e.lat,
                    lon: e.lon,
                    track_id: e.track_id,
                    diary_entry_id: e.diary_entry_id,
                })
                .collect();
            entries.sort_by_key(|e| e.id);

            MapGroupView {
                id: g.group.id,
                name: g.group.name,
                color: g.group.color,
                entries,
            }
        })
        .collect();

    let mut tracks: Vec<TrackSummary> = tracks
        .iter()
        .map(|t| TrackSummary::from_track(t, filters))
        .collect();
    tracks.sort_by_key(|t| t.id);

    MapView {
        groups,
        tracks,
        browser_key,
    }
}
