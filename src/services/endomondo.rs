// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Endomondo client for importing legacy workouts.
//!
//! Endomondo has no OAuth; the diary logs in with a shared account and
//! keeps the session cookie, logging in again when the session expires.
//! Workouts come back with row-wise points.

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::TrackPoint;
use crate::services::ingest::{ActivitySource, Provider, SourceActivity};
use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

const BASE_URL: &str = "https://www.endomondo.com/";
const LOGIN_PATH: &str = "rest/session";
const SUBSCRIPTIONS_PATH: &str = "rest/v1/feeds/subscriptions";
const SUBSCRIPTIONS_LIMIT: u32 = 20;

/// Endomondo accepts any CSRF token as long as the cookie and header agree.
const CSRF_TOKEN: &str = "-";

/// Cookie-session Endomondo client.
pub struct EndomondoClient {
    http: reqwest::Client,
    base_url: Url,
    email: String,
    password: String,
    /// Whether the cookie jar holds a live session.
    logged_in: Mutex<bool>,
}

impl EndomondoClient {
    pub fn new(email: String, password: String) -> Result<Self, AppError> {
        let base_url = Url::parse(BASE_URL)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Endomondo URL: {}", e)))?;

        let jar = Arc::new(Jar::default());
        jar.add_cookie_str(&format!("CSRF_TOKEN={}; Path=/", CSRF_TOKEN), &base_url);

        let http = reqwest::Client::builder()
            .cookie_provider(jar)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            email,
            password,
            logged_in: Mutex::new(false),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-CSRF-TOKEN", CSRF_TOKEN)
    }

    /// Log in unless a session is already live.
    ///
    /// The lock is held across the login so concurrent callers wait for
    /// one login instead of racing their own.
    async fn ensure_session(&self, force: bool) -> Result<(), AppError> {
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in && !force {
            return Ok(());
        }
        *logged_in = false;

        let body = serde_json::json!({
            "email": self.email,
            "password": self.password,
            "remember": true,
        });
        let response = self
            .request(reqwest::Method::POST, LOGIN_PATH)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(AppError::Auth(format!(
                "Endomondo login failed: HTTP {}",
                response.status()
            )));
        }

        *logged_in = true;
        tracing::info!(relogin = force, "Logged in to Endomondo");
        Ok(())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        self.ensure_session(false).await?;

        with_relogin(
            || self.fetch_json(path, query),
            || self.ensure_session(true),
        )
        .await
    }

    async fn fetch_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => AppError::Auth(format!("Endomondo session rejected: {}", body)),
                404 => AppError::NotFound(format!("Endomondo resource {}", path)),
                _ => AppError::Upstream(format!("Endomondo HTTP {}: {}", status, body)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Endomondo JSON parse error: {}", e)))
    }

    /// One workout with its points.
    pub async fn workout(&self, user_id: u64, workout_id: u64) -> Result<Workout, AppError> {
        self.get_json(
            &format!("rest/v1/users/{}/workouts/{}", user_id, workout_id),
            &[],
        )
        .await
    }

    /// Recent workouts from the account's feed, for the import form.
    pub async fn subscriptions(&self) -> Result<Vec<WorkoutSummary>, AppError> {
        let feed: SubscriptionsResponse = self
            .get_json(
                SUBSCRIPTIONS_PATH,
                &[("limit", SUBSCRIPTIONS_LIMIT.to_string())],
            )
            .await?;

        Ok(feed
            .data
            .into_iter()
            .filter(|entry| entry.readable_type == "WORKOUT")
            .filter_map(|entry| {
                let workout = entry.workout?;
                Some(WorkoutSummary {
                    activity_id: format!("{}-{}", entry.author.id, workout.id),
                    name: entry.author.name,
                    sport: workout.sport,
                    start_time: workout.start_time,
                    distance_km: workout.distance,
                })
            })
            .collect())
    }
}

/// Run `call`; if the session was rejected, log in again once and retry
/// once. A second rejection is returned as is.
async fn with_relogin<T, C, CF, L, LF>(call: C, relogin: L) -> Result<T, AppError>
where
    C: Fn() -> CF,
    CF: Future<Output = Result<T, AppError>>,
    L: FnOnce() -> LF,
    LF: Future<Output = Result<(), AppError>>,
{
    match call().await {
        Err(e) if e.is_auth_error() => {
            tracing::info!(error = %e, "Endomondo session expired, logging in again");
        }
        other => return other,
    }

    relogin().await?;
    call().await
}

fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Canceled(format!("Endomondo request timed out: {}", e))
    } else {
        AppError::Upstream(format!("Endomondo request failed: {}", e))
    }
}

/// Split an activity id of the form `"<user>-<workout>"`.
pub fn parse_activity_id(activity_id: &str) -> Result<(u64, u64), AppError> {
    let bad = || {
        AppError::BadRequest(format!(
            "invalid Endomondo activity id '{}', expected '<user>-<workout>'",
            activity_id
        ))
    };

    let (user, workout) = activity_id.split_once('-').ok_or_else(bad)?;
    Ok((
        user.parse().map_err(|_| bad())?,
        workout.parse().map_err(|_| bad())?,
    ))
}

impl ActivitySource for EndomondoClient {
    fn provider(&self) -> Provider {
        Provider::Endomondo
    }

    async fn fetch_activity(
        &self,
        principal: &AuthUser,
        activity_id: &str,
    ) -> Result<SourceActivity, AppError> {
        let (user_id, workout_id) = parse_activity_id(activity_id)?;
        let workout = self.workout(user_id, workout_id).await?;

        tracing::debug!(
            requested_by = principal.user_id,
            workout_id,
            sport = workout.sport,
            points = workout.points.points.len(),
            "Fetched Endomondo workout"
        );

        let points = workout
            .points
            .points
            .into_iter()
            .map(|p| TrackPoint {
                time: p.time,
                latitude: p.latitude,
                longitude: p.longitude,
                elevation: p.altitude,
                distance: p.distance,
            })
            .collect();

        Ok(SourceActivity {
            id: workout.id.to_string(),
            name: workout.title,
            activity_type: workout.sport.to_string(),
            start_time: workout.start_time,
            total_distance_km: workout.distance,
            elapsed_time_secs: workout.duration,
            average_speed_kmh: workout.speed_avg,
            points,
        })
    }
}

/// Workout detail. Distances are km, speeds km/h.
#[derive(Debug, Clone, Deserialize)]
pub struct Workout {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub sport: i64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub distance: f64,
    /// Seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub speed_avg: f64,
    #[serde(default)]
    pub points: WorkoutPoints,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkoutPoints {
    #[serde(default)]
    pub points: Vec<WorkoutPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkoutPoint {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    pub altitude: Option<f64>,
    #[serde(default)]
    pub distance: f64,
}

#[derive(Debug, Deserialize)]
struct SubscriptionsResponse {
    #[serde(default)]
    data: Vec<SubscriptionEntry>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionEntry {
    #[serde(default)]
    readable_type: String,
    author: FeedUser,
    workout: Option<FeedWorkout>,
}

#[derive(Debug, Deserialize)]
struct FeedUser {
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct FeedWorkout {
    id: u64,
    sport: i64,
    start_time: DateTime<Utc>,
    #[serde(default)]
    distance: f64,
}

/// Feed workout as offered in the import form.
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutSummary {
    /// `"<user>-<workout>"`, ready to pass back for import
    pub activity_id: String,
    /// Author name
    pub name: String,
    pub sport: i64,
    pub start_time: DateTime<Utc>,
    pub distance_km: f64,
}
