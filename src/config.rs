// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;

/// Default provider/type pairs whose tracks are recorded uphill-last and
/// get reversed on import.
pub const DEFAULT_DESCENDING_ACTIVITY_TYPES: &str = "strava:Ride,endomondo:3";

/// Default deadline for a single track import, in seconds.
pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 30;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Google Maps key handed to browsers for the map view
    pub google_maps_browser_key: String,
    /// `provider:type` pairs that trigger track reversal
    pub descending_activity_types: Vec<String>,
    /// Deadline for provider + geocoder calls during one import
    pub import_timeout_secs: u64,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
    /// Google Maps server key for geocoding
    pub google_maps_server_key: String,
    /// Legacy Endomondo account (both must be set to enable the provider)
    pub endomondo_email: Option<String>,
    pub endomondo_password: Option<String>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            google_maps_browser_key: "test_browser_key".to_string(),
            descending_activity_types: parse_list(DEFAULT_DESCENDING_ACTIVITY_TYPES),
            import_timeout_secs: DEFAULT_IMPORT_TIMEOUT_SECS,
            strava_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key_32_bytes!!".to_vec(),
            google_maps_server_key: "test_server_key".to_string(),
            endomondo_email: None,
            endomondo_password: None,
        }
    }
}

impl Config {
    /// Config for tests (offline, no provider accounts).
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();

        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(|v| v.trim().as_bytes().to_vec())
            .unwrap_or_else(|_| jwt_signing_key.clone());

        let import_timeout_secs = match env::var("IMPORT_TIMEOUT_SECS") {
            Ok(raw) => parse_import_timeout(&raw)?,
            Err(_) => DEFAULT_IMPORT_TIMEOUT_SECS,
        };

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            google_maps_browser_key: env::var("GOOGLE_MAPS_BROWSER_KEY").unwrap_or_default(),
            descending_activity_types: parse_list(
                &env::var("DESCENDING_ACTIVITY_TYPES")
                    .unwrap_or_else(|_| DEFAULT_DESCENDING_ACTIVITY_TYPES.to_string()),
            ),
            import_timeout_secs,

            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            jwt_signing_key,
            oauth_state_key,
            google_maps_server_key: env::var("GOOGLE_MAPS_SERVER_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_MAPS_SERVER_KEY"))?,
            endomondo_email: env::var("ENDOMONDO_EMAIL").ok(),
            endomondo_password: env::var("ENDOMONDO_PASSWORD").ok(),
        })
    }

    /// Endomondo credentials, if both halves are configured.
    pub fn endomondo_credentials(&self) -> Option<(&str, &str)> {
        match (&self.endomondo_email, &self.endomondo_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}

/// Split a comma-separated env value, dropping empty items.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Whole seconds, at least one. A zero deadline would cancel every import.
fn parse_import_timeout(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::Invalid("IMPORT_TIMEOUT_SECS", raw.to_string())),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("STRAVA_CLIENT_ID", "test_id");
        env::set_var("STRAVA_CLIENT_SECRET", "test_secret");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("GOOGLE_MAPS_SERVER_KEY", "server_key");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.strava_client_id, "test_id");
        assert_eq!(config.strava_client_secret, "test_secret");
        assert_eq!(config.google_maps_server_key, "server_key");
        assert_eq!(config.port, 8080);
        assert!(!config.descending_activity_types.is_empty());
    }

    #[test]
    fn test_parse_list_trims_and_skips_empty() {
        assert_eq!(
            parse_list(" strava:Ride, ,endomondo:3 ,"),
            vec!["strava:Ride".to_string(), "endomondo:3".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_parse_import_timeout() {
        assert_eq!(parse_import_timeout(" 45 ").unwrap(), 45);
        for raw in ["0", "abc", "-5", ""] {
            assert!(
                matches!(
                    parse_import_timeout(raw),
                    Err(ConfigError::Invalid("IMPORT_TIMEOUT_SECS", ref v)) if v == raw
                ),
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn test_endomondo_credentials_need_both_halves() {
        let mut config = Config::test_default();
        assert!(config.endomondo_credentials().is_none());

        config.endomondo_email = Some("me@example.com".to_string());
        assert!(config.endomondo_credentials().is_none());

        config.endomondo_password = Some("hunter2".to_string());
        assert_eq!(
            config.endomondo_credentials(),
            Some(("me@example.com", "hunter2"))
        );
    }
}
