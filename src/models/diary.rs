// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Diary entry model.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Diary entry (collection `diary_entries`).
///
/// Only the fields the track pipeline needs; text, comments and pictures
/// live with the diary frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: u64,
    pub title: String,
    /// User ID of the author (Strava athlete ID)
    pub author_id: u64,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub map_entry_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiaryEntry {
    /// Only the author may attach tracks to an entry.
    pub fn can_edit(&self, user_id: u64) -> bool {
        self.author_id == user_id
    }

    pub fn year(&self) -> i32 {
        self.created_at.year()
    }
}
