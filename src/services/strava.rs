// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for importing activities.
//!
//! Handles:
//! - Activity and stream fetching
//! - Recent activity listing for the import form
//! - OAuth code exchange
//! - Token refresh when Strava rejects the access token

use crate::error::AppError;
use crate::services::ingest::Stream;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;

const STRAVA_OAUTH_TOKEN_URL: &str = "https://www.strava.com/oauth/token";

/// Streams requested for a track import.
pub const STREAM_KEYS: &str = "time,distance,latlng,altitude";

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://www.strava.com/api/v3".to_string(),
            token_url: STRAVA_OAUTH_TOKEN_URL.to_string(),
            client_id,
            client_secret,
        }
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);
        self.get_json(&url, access_token, &[]).await
    }

    /// Get the columnar point streams of an activity.
    pub async fn get_activity_streams(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<Vec<Stream>, AppError> {
        let url = format!("{}/activities/{}/streams", self.base_url, activity_id);
        let response: StreamsResponse = self
            .get_json(&url, access_token, &[("keys", STREAM_KEYS.to_string())])
            .await?;
        Ok(response.into_streams())
    }

    /// List the athlete's most recent activities.
    pub async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivitySummary>, AppError> {
        let url = format!("{}/athlete/activities", self.base_url);
        self.get_json(
            &url,
            access_token,
            &[
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ],
        )
        .await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| transport_error("token refresh", e))?;

        // A rejected refresh token means the user must reconnect.
        if response.status().is_client_error() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Strava token refresh rejected");
            return Err(AppError::Auth(format!("token refresh rejected: {}", status)));
        }

        check_response_json(response).await
    }

    /// Exchange an OAuth authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| transport_error("token exchange", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Strava token exchange failed");
            return Err(AppError::Upstream(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse token response: {}", e)))
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error("GET", e))?;

        check_response_json(response).await
    }
}

fn transport_error(what: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Canceled(format!("Strava {} timed out: {}", what, e))
    } else {
        AppError::Upstream(format!("Strava {} failed: {}", what, e))
    }
}

/// Check response status and parse the JSON body.
///
/// 401 becomes [`AppError::Auth`] so the caller can refresh; 404 is
/// `NotFound`; anything else non-2xx is `Upstream`.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        return Err(match status.as_u16() {
            401 => AppError::Auth(AppError::PROVIDER_TOKEN_REJECTED.to_string()),
            404 => AppError::NotFound(format!("Strava resource: {}", body)),
            429 => {
                tracing::warn!("Strava rate limit hit (429)");
                AppError::Upstream(format!("HTTP {}: rate limited", status))
            }
            _ => AppError::Upstream(format!("HTTP {}: {}", status, body)),
        });
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("JSON parse error: {}", e)))
}

/// Access/refresh token pair handed to [`with_token_refresh`].
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Run `call` with the current access token, refreshing once on rejection.
///
/// If `call` fails with [`AppError::Auth`], `refresh` is invoked exactly once
/// (it must persist the new pair before returning it) and `call` is retried
/// exactly once with the new access token. A second rejection is fatal.
/// Other errors are returned as-is without a retry.
pub async fn with_token_refresh<T, C, CF, R, RF>(
    tokens: TokenPair,
    call: C,
    refresh: R,
) -> Result<T, AppError>
where
    C: Fn(String) -> CF,
    CF: Future<Output = Result<T, AppError>>,
    R: FnOnce(TokenPair) -> RF,
    RF: Future<Output = Result<TokenPair, AppError>>,
{
    match call(tokens.access_token.clone()).await {
        Err(e) if e.is_auth_error() => {
            tracing::info!("Provider rejected access token, refreshing");
        }
        other => return other,
    }

    let refreshed = refresh(tokens).await?;

    match call(refreshed.access_token).await {
        Err(e) if e.is_auth_error() => {
            tracing::warn!("Provider rejected refreshed access token");
            Err(AppError::Auth(
                "access token rejected after refresh".to_string(),
            ))
        }
        other => other,
    }
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Token exchange response from Strava OAuth (includes athlete info).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub athlete: StravaAthlete,
}

/// Athlete info from OAuth token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    pub profile: Option<String>,
}

/// Detailed Strava activity response.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    /// Metres
    pub distance: f64,
    /// Seconds
    pub elapsed_time: f64,
    /// Metres per second
    #[serde(default)]
    pub average_speed: f64,
}

/// Summary activity for list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivitySummary {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    pub distance: f64,
}

/// Streams come back as a list, or keyed by type when `key_by_type` is on.
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamsResponse {
    List(Vec<Stream>),
    ByType(HashMap<String, Stream>),
}

impl StreamsResponse {
    fn into_streams(self) -> Vec<Stream> {
        match self {
            StreamsResponse::List(streams) => streams,
            StreamsResponse::ByType(map) => map
                .into_iter()
                .map(|(kind, mut stream)| {
                    if stream.kind.is_empty() {
                        stream.kind = kind;
                    }
                    stream
                })
                .collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StravaService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::FirestoreDb;
use crate::middleware::auth::AuthUser;
use crate::models::{ProviderTokens, User};
use crate::services::ingest::{points_from_streams, ActivitySource, Provider, SourceActivity};
use crate::units;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared refresh locks type for use in AppState.
pub type RefreshLocks = Arc<DashMap<u64, Arc<Mutex<()>>>>;

/// Page size for the import form's activity list.
const RECENT_ACTIVITIES_PER_PAGE: u32 = 30;

/// High-level Strava service that manages token lifecycle and API calls.
///
/// Tokens live in Firestore. A rejected access token is refreshed once
/// under a per-user lock, persisted, and the call retried once.
#[derive(Clone)]
pub struct StravaService {
    client: StravaClient,
    db: FirestoreDb,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
}

impl StravaService {
    pub fn new(client: StravaClient, db: FirestoreDb, refresh_locks: RefreshLocks) -> Self {
        Self {
            client,
            db,
            refresh_locks,
        }
    }

    // ─── Token Management ────────────────────────────────────────────────────

    async fn load_tokens(&self, user_id: u64) -> Result<ProviderTokens, AppError> {
        self.db
            .get_tokens(user_id)
            .await?
            .ok_or_else(|| AppError::Auth(format!("user {} has no Strava tokens", user_id)))
    }

    /// Refresh tokens for `user_id` and persist them.
    ///
    /// Serialized per user. If another task already replaced the stale
    /// access token while we waited, its tokens are used without calling
    /// Strava again.
    async fn refresh_and_store(
        &self,
        user_id: u64,
        stale: TokenPair,
    ) -> Result<TokenPair, AppError> {
        let lock = self
            .refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;

        let current = self.load_tokens(user_id).await?;
        if current.access_token != stale.access_token {
            tracing::debug!(user_id, "Tokens refreshed by another task");
            return Ok(TokenPair {
                access_token: current.access_token,
                refresh_token: current.refresh_token,
            });
        }

        let fresh = self.client.refresh_token(&stale.refresh_token).await?;
        let expires_at = DateTime::from_timestamp(fresh.expires_at, 0)
            .unwrap_or_default()
            .to_rfc3339();

        self.db
            .set_tokens(
                user_id,
                &ProviderTokens {
                    access_token: fresh.access_token.clone(),
                    refresh_token: fresh.refresh_token.clone(),
                    expires_at,
                },
            )
            .await?;

        tracing::info!(user_id, "Strava token refreshed and stored");

        Ok(TokenPair {
            access_token: fresh.access_token,
            refresh_token: fresh.refresh_token,
        })
    }

    /// Run an authenticated Strava call for `user_id` under the refresh
    /// protocol.
    async fn authorized<T, C, CF>(&self, user_id: u64, call: C) -> Result<T, AppError>
    where
        C: Fn(String) -> CF,
        CF: Future<Output = Result<T, AppError>>,
    {
        let tokens = self.load_tokens(user_id).await?;
        let pair = TokenPair {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        };

        with_token_refresh(pair, call, |stale| self.refresh_and_store(user_id, stale)).await
    }

    // ─── OAuth Callback Handling ─────────────────────────────────────────────

    /// Handle OAuth callback: exchange code for tokens, store user and tokens.
    pub async fn handle_oauth_callback(&self, code: &str) -> Result<OAuthResult, AppError> {
        let token_response = self.client.exchange_code(code).await?;

        let athlete_id = token_response.athlete.id;
        let now = Utc::now();

        // Keep the original sign-up time across sign-ins.
        let created_at = match self.db.get_user(athlete_id).await {
            Ok(Some(existing)) => existing.created_at,
            _ => now,
        };

        let user = User {
            strava_athlete_id: athlete_id,
            firstname: token_response.athlete.firstname.clone(),
            lastname: token_response.athlete.lastname.clone(),
            profile_picture: token_response.athlete.profile.clone(),
            created_at,
            last_active: now,
        };

        if let Err(e) = self.db.upsert_user(&user).await {
            tracing::warn!(error = %e, "Failed to store user profile, continuing anyway");
        }

        let expires_at = DateTime::from_timestamp(token_response.expires_at, 0)
            .unwrap_or(now)
            .to_rfc3339();

        self.db
            .set_tokens(
                athlete_id,
                &ProviderTokens {
                    access_token: token_response.access_token,
                    refresh_token: token_response.refresh_token,
                    expires_at,
                },
            )
            .await?;

        tracing::info!(
            athlete_id,
            firstname = %token_response.athlete.firstname,
            "OAuth callback handled, user and tokens stored"
        );

        Ok(OAuthResult {
            athlete_id,
            firstname: token_response.athlete.firstname,
            lastname: token_response.athlete.lastname,
        })
    }

    // ─── API Wrappers ────────────────────────────────────────────────────────

    /// Recent activities for the import form.
    pub async fn list_activities(
        &self,
        principal: &AuthUser,
    ) -> Result<Vec<StravaActivitySummary>, AppError> {
        self.authorized(principal.user_id, |token| async move {
            self.client
                .list_activities(&token, 1, RECENT_ACTIVITIES_PER_PAGE)
                .await
        })
        .await
    }
}

impl ActivitySource for StravaService {
    fn provider(&self) -> Provider {
        Provider::Strava
    }

    async fn fetch_activity(
        &self,
        principal: &AuthUser,
        activity_id: &str,
    ) -> Result<SourceActivity, AppError> {
        let id: u64 = activity_id
            .parse()
            .map_err(|_| AppError::BadRequest(format!("invalid Strava activity id '{}'", activity_id)))?;

        let activity = self
            .authorized(principal.user_id, |token| async move {
                self.client.get_activity(&token, id).await
            })
            .await?;

        let streams = self
            .authorized(principal.user_id, |token| async move {
                self.client.get_activity_streams(&token, id).await
            })
            .await?;

        let points = points_from_streams(activity.start_date, &streams)?;

        tracing::debug!(
            activity_id = id,
            activity_type = %activity.activity_type,
            points = points.len(),
            "Fetched Strava activity"
        );

        Ok(SourceActivity {
            id: activity.id.to_string(),
            name: activity.name,
            activity_type: activity.activity_type,
            start_time: activity.start_date,
            total_distance_km: units::meters_to_km(activity.distance),
            elapsed_time_secs: activity.elapsed_time,
            average_speed_kmh: units::mps_to_kmh(activity.average_speed),
            points,
        })
    }
}

/// Result of handling OAuth callback.
#[derive(Debug, Clone)]
pub struct OAuthResult {
    pub athlete_id: u64,
    pub firstname: String,
    pub lastname: String,
}
