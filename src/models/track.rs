// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GPS track model and its serialized point format.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One GPS sample.
///
/// Serialized as `{"time", "lat", "lon", "elevation", "dist"}`; this is the
/// point-array format persisted in [`Track::data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    #[serde(alias = "time.Time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    /// Cumulative distance from the track start (km)
    #[serde(rename = "dist")]
    pub distance: f64,
}

impl TrackPoint {
    /// A zero coordinate marks a missing fix, not the equator/prime meridian.
    pub fn is_valid(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0
    }
}

/// Stored track record (collection `tracks`).
///
/// Summary fields are derived once at import and only replaced by a
/// re-import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    /// Place name of the first point
    pub start_label: String,
    /// Place name of the last point
    pub end_label: String,
    /// Track start time
    pub date: DateTime<Utc>,
    /// Total distance (km)
    pub length: f64,
    /// Elapsed time (seconds)
    pub duration: f64,
    /// Average speed (km/h)
    pub avg_speed: f64,
    /// `provider:external id` of the imported activity
    pub source_workout_id: String,
    /// Serialized point array
    pub data: String,
    /// Simplified, percent-encoded polyline for static map URLs
    pub map_url: String,
    pub updated_at: DateTime<Utc>,
}

impl Track {
    /// Decode the stored point array.
    pub fn points(&self) -> Result<Vec<TrackPoint>, AppError> {
        decode_points(&self.data)
    }

    /// Whether this track was imported from the given source activity.
    pub fn is_from_workout(&self, source_workout_id: &str) -> bool {
        !self.source_workout_id.is_empty() && self.source_workout_id == source_workout_id
    }
}

/// Serialize points into the stored point-array format.
pub fn encode_points(points: &[TrackPoint]) -> Result<String, AppError> {
    serde_json::to_string(points)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize points: {}", e)))
}

/// Decode a stored point array.
///
/// Older records hold numeric fields as strings (`"46.05"`) and use the key
/// `time.Time` for the timestamp. Both spellings are accepted here so the
/// rest of the crate only sees [`TrackPoint`]. Errors name the point index
/// and field that could not be read.
pub fn decode_points(raw: &str) -> Result<Vec<TrackPoint>, AppError> {
    let items: Vec<Value> = serde_json::from_str(raw).map_err(|e| AppError::MalformedPoint {
        index: 0,
        field: format!("<array>: {}", e),
    })?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let obj = item.as_object().ok_or_else(|| AppError::MalformedPoint {
                index,
                field: "<object>".to_string(),
            })?;
            decode_point(index, obj)
        })
        .collect()
}

fn decode_point(index: usize, obj: &Map<String, Value>) -> Result<TrackPoint, AppError> {
    let malformed = |field: &str| AppError::MalformedPoint {
        index,
        field: field.to_string(),
    };

    let time = obj
        .get("time")
        .or_else(|| obj.get("time.Time"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| malformed("time"))?;

    let required = |field: &str| -> Result<f64, AppError> {
        obj.get(field)
            .and_then(legacy_float)
            .ok_or_else(|| malformed(field))
    };

    let elevation = match obj.get("elevation") {
        None | Some(Value::Null) => None,
        Some(v) => Some(legacy_float(v).ok_or_else(|| malformed("elevation"))?),
    };

    Ok(TrackPoint {
        time,
        latitude: required("lat")?,
        longitude: required("lon")?,
        elevation,
        distance: required("dist")?,
    })
}

/// Read a float stored either as a JSON number or a numeric string.
pub fn legacy_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
