// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Track ingestion: provider activities → uniform track points.
//!
//! Providers deliver points either row-wise (Endomondo) or as parallel
//! columnar streams (Strava). Both end up as an ordered `Vec<TrackPoint>`
//! with invalid fixes removed.

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::TrackPoint;
use crate::units;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::future::Future;

/// Streams must come from this resolution tier.
pub const HIGH_RESOLUTION: &str = "high";

/// Fitness providers we can import from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Strava,
    Endomondo,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Strava => "strava",
            Provider::Endomondo => "endomondo",
        }
    }

    /// Key stored in `Track::source_workout_id`.
    pub fn workout_key(&self, activity_id: &str) -> String {
        format!("{}:{}", self.as_str(), activity_id)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An activity as fetched from a provider, already in track units.
#[derive(Debug, Clone)]
pub struct SourceActivity {
    pub id: String,
    pub name: String,
    /// Provider-specific type/sport (e.g. `"Ride"`, or an Endomondo sport code)
    pub activity_type: String,
    pub start_time: DateTime<Utc>,
    pub total_distance_km: f64,
    pub elapsed_time_secs: f64,
    pub average_speed_kmh: f64,
    /// Points in recording order (may still contain invalid fixes)
    pub points: Vec<TrackPoint>,
}

/// A provider that can deliver one activity with its points.
pub trait ActivitySource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetch activity metadata and points for `activity_id`, acting as
    /// `principal`.
    fn fetch_activity(
        &self,
        principal: &AuthUser,
        activity_id: &str,
    ) -> impl Future<Output = Result<SourceActivity, AppError>> + Send;
}

/// One columnar stream from the Strava streams endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Stream {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub series_type: String,
    pub original_size: usize,
    pub resolution: String,
    pub data: serde_json::Value,
}

/// Rebuild row-wise points from index-aligned streams.
///
/// `time` holds second offsets from `start_time`, `distance` metres,
/// `latlng` `[lat, lon]` pairs and `altitude` metres. Every stream must be
/// high resolution and agree on its size; unknown stream types are skipped.
pub fn points_from_streams(
    start_time: DateTime<Utc>,
    streams: &[Stream],
) -> Result<Vec<TrackPoint>, AppError> {
    let mut size: Option<usize> = None;
    let mut points: Vec<TrackPoint> = Vec::new();

    for stream in streams {
        if stream.resolution != HIGH_RESOLUTION {
            return Err(AppError::DataShape(format!(
                "stream '{}' has resolution '{}', expected '{}'",
                stream.kind, stream.resolution, HIGH_RESOLUTION
            )));
        }

        match size {
            None => {
                size = Some(stream.original_size);
                points = (0..stream.original_size)
                    .map(|_| TrackPoint {
                        time: start_time,
                        latitude: 0.0,
                        longitude: 0.0,
                        elevation: None,
                        distance: 0.0,
                    })
                    .collect();
            }
            Some(expected) if expected != stream.original_size => {
                return Err(AppError::DataShape(format!(
                    "stream '{}' has size {}, expected {}",
                    stream.kind, stream.original_size, expected
                )));
            }
            Some(_) => {}
        }

        match stream.kind.as_str() {
            "time" => {
                let offsets: Vec<i64> = stream_data(stream)?;
                for (point, offset) in points.iter_mut().zip(offsets) {
                    point.time = start_time + Duration::seconds(offset);
                }
            }
            "distance" => {
                let meters: Vec<f64> = stream_data(stream)?;
                for (point, d) in points.iter_mut().zip(meters) {
                    point.distance = units::meters_to_km(d);
                }
            }
            "latlng" => {
                let coords: Vec<[f64; 2]> = stream_data(stream)?;
                for (point, [lat, lon]) in points.iter_mut().zip(coords) {
                    point.latitude = lat;
                    point.longitude = lon;
                }
            }
            "altitude" => {
                let altitudes: Vec<f64> = stream_data(stream)?;
                for (point, alt) in points.iter_mut().zip(altitudes) {
                    point.elevation = Some(alt);
                }
            }
            other => {
                tracing::debug!(stream = other, "Ignoring unused stream");
            }
        }
    }

    Ok(points)
}

/// Decode a stream's data array and check it matches `original_size`.
fn stream_data<T: for<'de> Deserialize<'de>>(stream: &Stream) -> Result<Vec<T>, AppError> {
    let data: Vec<T> = serde_json::from_value(stream.data.clone()).map_err(|e| {
        AppError::DataShape(format!("stream '{}' data unreadable: {}", stream.kind, e))
    })?;

    if data.len() != stream.original_size {
        return Err(AppError::DataShape(format!(
            "stream '{}' has {} samples, declared {}",
            stream.kind,
            data.len(),
            stream.original_size
        )));
    }

    Ok(data)
}

/// Drop points without a GPS fix.
pub fn filter_valid_points(points: Vec<TrackPoint>) -> Vec<TrackPoint> {
    let before = points.len();
    let valid: Vec<TrackPoint> = points.into_iter().filter(TrackPoint::is_valid).collect();

    if valid.len() != before {
        tracing::debug!(
            dropped = before - valid.len(),
            kept = valid.len(),
            "Dropped points without a fix"
        );
    }

    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2021-08-14T07:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn stream(kind: &str, data: serde_json::Value, size: usize) -> Stream {
        Stream {
            kind: kind.to_string(),
            series_type: "distance".to_string(),
            original_size: size,
            resolution: HIGH_RESOLUTION.to_string(),
            data,
        }
    }

    #[test]
    fn test_points_from_streams_aligns_by_index() {
        let streams = vec![
            stream("time", json!([0, 30, 60]), 3),
            stream("distance", json!([0.0, 120.0, 250.0]), 3),
            stream("latlng", json!([[46.0, 14.0], [46.001, 14.001], [46.002, 14.002]]), 3),
            stream("altitude", json!([300.0, 305.5, 311.0]), 3),
        ];

        let points = points_from_streams(start(), &streams).unwrap();

        assert_eq!(points.len(), 3);
        assert_eq!(points[1].time, start() + Duration::seconds(30));
        assert_eq!(points[1].distance, 0.12);
        assert_eq!(points[2].latitude, 46.002);
        assert_eq!(points[2].longitude, 14.002);
        assert_eq!(points[1].elevation, Some(305.5));
    }

    #[test]
    fn test_points_from_streams_rejects_low_resolution() {
        let mut low = stream("latlng", json!([[46.0, 14.0]]), 1);
        low.resolution = "low".to_string();

        let err = points_from_streams(start(), &[stream("time", json!([0]), 1), low]).unwrap_err();
        assert!(matches!(err, AppError::DataShape(_)));
    }

    #[test]
    fn test_points_from_streams_rejects_size_mismatch() {
        let streams = vec![
            stream("time", json!([0, 1, 2]), 3),
            stream("distance", json!([0.0, 1.0]), 2),
        ];
        let err = points_from_streams(start(), &streams).unwrap_err();
        assert!(matches!(err, AppError::DataShape(_)));
    }

    #[test]
    fn test_points_from_streams_rejects_short_data() {
        let streams = vec![stream("time", json!([0, 1]), 3)];
        let err = points_from_streams(start(), &streams).unwrap_err();
        assert!(matches!(err, AppError::DataShape(_)));
    }

    #[test]
    fn test_points_from_streams_ignores_unknown_streams() {
        let streams = vec![
            stream("time", json!([0, 1]), 2),
            stream("heartrate", json!([120, 121]), 2),
        ];
        let points = points_from_streams(start(), &streams).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_filter_valid_points_counts() {
        let coords = [(46.0, 14.0), (0.0, 14.0), (46.0, 0.0), (0.0, 0.0), (45.9, 13.9)];
        let points: Vec<TrackPoint> = coords
            .iter()
            .map(|&(lat, lon)| TrackPoint {
                time: start(),
                latitude: lat,
                longitude: lon,
                elevation: None,
                distance: 0.0,
            })
            .collect();

        let expected = coords.iter().filter(|(a, b)| *a != 0.0 && *b != 0.0).count();
        let valid = filter_valid_points(points);

        assert_eq!(valid.len(), expected);
        assert!(valid.iter().all(TrackPoint::is_valid));
    }

    #[test]
    fn test_workout_key() {
        assert_eq!(Provider::Strava.workout_key("123"), "strava:123");
        assert_eq!(Provider::Endomondo.workout_key("4-5"), "endomondo:4-5");
    }
}
