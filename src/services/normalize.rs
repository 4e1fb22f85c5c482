// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Track normalization and import.
//!
//! Turns a provider activity into a stored [`Track`]:
//! 1. Skip if the existing track already came from this activity
//! 2. Fetch points and drop invalid fixes
//! 3. Reverse descending categories so tracks read uphill-first
//! 4. Label start and end via the geocoder
//! 5. Encode the map polyline and serialize the points

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::track::encode_points;
use crate::models::{Track, TrackPoint};
use crate::services::geocode::Geocoder;
use crate::services::ingest::{filter_valid_points, ActivitySource, Provider, SourceActivity};
use crate::services::map::{encode_polyline, MAX_ENCODED_POLYLINE_LEN};
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;

/// Reverse a track in place, keeping it well-formed.
///
/// Point order flips and each point's time and cumulative distance are
/// mirrored, so times and distances still increase from the new first
/// point, whose distance is zero. Applying it twice restores times exactly.
/// Distances of a track starting at zero come back only up to f64 rounding,
/// since each pass subtracts from the running total.
pub fn reverse_points(points: &mut [TrackPoint]) {
    if points.len() <= 1 {
        return;
    }

    let start = points[0].time;
    let end = points[points.len() - 1].time;

    points.reverse();
    let total = points[0].distance;

    for point in points.iter_mut() {
        point.time = start + (end - point.time);
        point.distance = total - point.distance;
    }
}

/// `(provider, type)` with the provider lowercased, or None unless both
/// halves are present.
fn parse_category(entry: &str) -> Option<(String, String)> {
    let (provider, kind) = entry.split_once(':')?;
    let (provider, kind) = (provider.trim(), kind.trim());
    if provider.is_empty() || kind.is_empty() {
        return None;
    }
    Some((provider.to_lowercase(), kind.to_string()))
}

/// Activity categories recorded in the descending direction.
#[derive(Debug, Clone, Default)]
pub struct DescendingCategories {
    pairs: HashSet<(String, String)>,
}

impl DescendingCategories {
    /// Parse `provider:type` entries; malformed entries are logged and skipped.
    pub fn from_config(entries: &[String]) -> Self {
        let pairs = entries
            .iter()
            .filter_map(|entry| {
                let pair = parse_category(entry);
                if pair.is_none() {
                    tracing::warn!(entry = %entry, "Ignoring malformed descending category");
                }
                pair
            })
            .collect();
        Self { pairs }
    }

    pub fn is_descending(&self, provider: Provider, activity_type: &str) -> bool {
        self.pairs
            .contains(&(provider.as_str().to_string(), activity_type.to_string()))
    }
}

/// Result of an import request.
#[derive(Debug, Clone)]
pub enum ImportOutcome {
    /// The existing track already came from this activity; nothing fetched.
    Unchanged(Track),
    /// A freshly built track, ready to persist.
    Imported(Track),
}

impl ImportOutcome {
    pub fn track(&self) -> &Track {
        match self {
            ImportOutcome::Unchanged(t) | ImportOutcome::Imported(t) => t,
        }
    }

    pub fn into_track(self) -> Track {
        match self {
            ImportOutcome::Unchanged(t) | ImportOutcome::Imported(t) => t,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, ImportOutcome::Unchanged(_))
    }
}

/// Builds tracks from provider activities.
#[derive(Clone)]
pub struct TrackImporter<G: Geocoder> {
    geocoder: G,
    categories: DescendingCategories,
    timeout: Duration,
}

impl<G: Geocoder> TrackImporter<G> {
    pub fn new(geocoder: G, categories: DescendingCategories, timeout: Duration) -> Self {
        Self {
            geocoder,
            categories,
            timeout,
        }
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    /// Import `activity_id` from `source` as track `track_id`.
    ///
    /// Returns the existing track untouched when it was already imported
    /// from the same activity. Otherwise fetches and labels the activity
    /// under the import deadline and returns a complete track; nothing is
    /// persisted here.
    pub async fn import<S: ActivitySource>(
        &self,
        source: &S,
        principal: &AuthUser,
        track_id: u64,
        existing: Option<&Track>,
        activity_id: &str,
    ) -> Result<ImportOutcome, AppError> {
        let provider = source.provider();
        let workout_key = provider.workout_key(activity_id);

        if let Some(track) = existing {
            if track.is_from_workout(&workout_key) {
                tracing::info!(
                    track_id = track.id,
                    workout = %workout_key,
                    "Track already imported, skipping"
                );
                return Ok(ImportOutcome::Unchanged(track.clone()));
            }
        }

        let track = tokio::time::timeout(
            self.timeout,
            self.build_track(source, principal, track_id, activity_id),
        )
        .await
        .map_err(|_| {
            AppError::Canceled(format!(
                "import of {} exceeded {}s",
                workout_key,
                self.timeout.as_secs()
            ))
        })??;

        tracing::info!(
            track_id,
            user_id = principal.user_id,
            workout = %workout_key,
            length_km = track.length,
            "Track imported"
        );

        Ok(ImportOutcome::Imported(track))
    }

    async fn build_track<S: ActivitySource>(
        &self,
        source: &S,
        principal: &AuthUser,
        track_id: u64,
        activity_id: &str,
    ) -> Result<Track, AppError> {
        let provider = source.provider();
        let SourceActivity {
            name,
            activity_type,
            start_time,
            total_distance_km,
            elapsed_time_secs,
            average_speed_kmh,
            points,
            ..
        } = source.fetch_activity(principal, activity_id).await?;

        let mut points = filter_valid_points(points);
        if points.is_empty() {
            return Err(AppError::DataShape(format!(
                "activity {} ({}) has no points with a GPS fix",
                activity_id, name
            )));
        }

        if self.categories.is_descending(provider, &activity_type) {
            tracing::debug!(activity_type = %activity_type, "Reversing descending track");
            reverse_points(&mut points);
        }

        let first = &points[0];
        let last = &points[points.len() - 1];
        let start_label = self.geocoder.reverse(first.latitude, first.longitude).await?;
        let end_label = self.geocoder.reverse(last.latitude, last.longitude).await?;

        let polyline = encode_polyline(&points, MAX_ENCODED_POLYLINE_LEN)?;
        tracing::debug!(
            points = points.len(),
            stride = polyline.stride,
            "Encoded map polyline"
        );

        Ok(Track {
            id: track_id,
            start_label,
            end_label,
            date: start_time,
            length: total_distance_km,
            duration: elapsed_time_secs,
            avg_speed: average_speed_kmh,
            source_workout_id: provider.workout_key(activity_id),
            data: encode_points(&points)?,
            map_url: polyline.value,
            updated_at: Utc::now(),
        })
    }
}
