// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Nanoseconds since the Unix epoch as the unsigned value fed to etag hashes.
///
/// Returns `None` outside the range representable in i64 nanoseconds
/// (roughly years 1677..2262) or before the epoch.
pub fn unix_nanos(date: DateTime<Utc>) -> Option<u64> {
    date.timestamp_nanos_opt().and_then(|n| u64::try_from(n).ok())
}
