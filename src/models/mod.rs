// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod diary;
pub mod map;
pub mod stats;
pub mod track;
pub mod user;

pub use diary::DiaryEntry;
pub use map::{MapEntry, MapGroup, MapGroupWithEntries};
pub use stats::YearStats;
pub use track::{decode_points, encode_points, Track, TrackPoint};
pub use user::{ProviderTokens, User};
