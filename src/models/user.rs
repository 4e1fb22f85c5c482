//! Diary authors and their provider credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A diary author, keyed by Strava athlete id (collection `users`).
///
/// Created or refreshed on every successful Strava sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub strava_athlete_id: u64,
    pub firstname: String,
    pub lastname: String,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last sign-in
    pub last_active: DateTime<Utc>,
}

/// Strava OAuth pair for one author (collection `tokens`, keyed by user id).
///
/// Replaced as a whole on refresh; the old refresh token is invalid
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// RFC 3339
    pub expires_at: String,
}
