// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Map groups and entries for the overview map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, colour-coded cluster of map entries (collection `map_groups`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapGroup {
    pub id: u64,
    pub name: String,
    /// CSS colour used for markers and track lines
    pub color: String,
    pub updated_at: DateTime<Utc>,
}

/// A located place, optionally carrying a track (collection `map_entries`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEntry {
    pub id: u64,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub description: String,
    pub map_group_id: u64,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    /// Owned track, if one was imported
    #[serde(default)]
    pub track_id: Option<u64>,
    /// Back-reference to the diary entry showing this place
    #[serde(default)]
    pub diary_entry_id: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

/// A group with its entries, as read for the overview map.
#[derive(Debug, Clone)]
pub struct MapGroupWithEntries {
    pub group: MapGroup,
    pub entries: Vec<MapEntry>,
}
