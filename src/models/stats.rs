//! Yearly track statistics.
//!
//! Computed on read from the tracks attached to published diary entries of
//! one year; nothing is stored.

use crate::models::{DiaryEntry, MapEntry, Track};
use serde::Serialize;
use std::collections::HashMap;

/// Per-track series for one year, in diary order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct YearStats {
    pub year: i32,
    /// Track lengths (km)
    pub distances: Vec<f64>,
    /// Track durations (seconds)
    pub durations: Vec<f64>,
    /// Average speeds (km/h)
    pub speeds: Vec<f64>,
}

impl YearStats {
    /// Collect the series for `year`.
    ///
    /// Entries that are unpublished, from another year, without a map entry,
    /// or whose map entry has no track are skipped.
    pub fn collect(
        year: i32,
        diary_entries: &[DiaryEntry],
        map_entries: &[MapEntry],
        tracks: &[Track],
    ) -> Self {
        let entries_by_id: HashMap<u64, &MapEntry> =
            map_entries.iter().map(|e| (e.id, e)).collect();
        let tracks_by_id: HashMap<u64, &Track> = tracks.iter().map(|t| (t.id, t)).collect();

        let mut diary: Vec<&DiaryEntry> = diary_entries
            .iter()
            .filter(|d| d.published && d.year() == year)
            .collect();
        diary.sort_by_key(|d| d.created_at);

        let mut stats = YearStats {
            year,
            ..Default::default()
        };

        for entry in diary {
            let track = entry
                .map_entry_id
                .and_then(|id| entries_by_id.get(&id))
                .and_then(|me| me.track_id)
                .and_then(|id| tracks_by_id.get(&id));

            if let Some(track) = track {
                stats.distances.push(track.length);
                stats.durations.push(track.duration);
                stats.speeds.push(track.avg_speed);
            }
        }

        stats
    }

    pub fn track_count(&self) -> usize {
        self.distances.len()
    }
}
