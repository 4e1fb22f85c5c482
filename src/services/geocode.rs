// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reverse/forward geocoding via the Google Geocoding API.

use crate::error::AppError;
use serde::Deserialize;
use std::future::Future;

/// Resolves coordinates to place names and back.
pub trait Geocoder: Send + Sync {
    /// Place label for a coordinate (locality preferred).
    fn reverse(&self, lat: f64, lon: f64) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Coordinate `(lat, lon)` of the best match for a free-form address.
    fn forward(&self, address: &str)
        -> impl Future<Output = Result<(f64, f64), AppError>> + Send;
}

/// Google Geocoding API client.
#[derive(Clone)]
pub struct GoogleGeocoder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            api_key,
        }
    }

    async fn query(&self, params: &[(&str, String)]) -> Result<Vec<GeocodeResult>, AppError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Canceled(format!("geocoder request timed out: {}", e))
                } else {
                    AppError::Geocode(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(AppError::Geocode(format!("HTTP {}", response.status())));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| AppError::Geocode(format!("JSON parse error: {}", e)))?;

        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => Ok(body.results),
            other => Err(AppError::Geocode(format!(
                "status {}{}",
                other,
                body.error_message
                    .map(|m| format!(": {}", m))
                    .unwrap_or_default()
            ))),
        }
    }
}

impl Geocoder for GoogleGeocoder {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<String, AppError> {
        let results = self.query(&[("latlng", format!("{},{}", lat, lon))]).await?;
        let label = pick_label(&results)?;
        tracing::debug!(lat, lon, label = %label, "Reverse geocoded");
        Ok(label)
    }

    async fn forward(&self, address: &str) -> Result<(f64, f64), AppError> {
        let results = self.query(&[("address", address.to_string())]).await?;
        let first = results
            .first()
            .ok_or_else(|| AppError::Geocode(format!("no results for '{}'", address)))?;
        Ok((first.geometry.location.lat, first.geometry.location.lng))
    }
}

/// Label of the top result: its `locality` component, else the formatted
/// address.
pub fn pick_label(results: &[GeocodeResult]) -> Result<String, AppError> {
    let first = results
        .first()
        .ok_or_else(|| AppError::Geocode("no results".to_string()))?;

    let locality = first
        .address_components
        .iter()
        .find(|c| c.types.iter().any(|t| t == "locality"))
        .map(|c| c.long_name.clone());

    Ok(locality.unwrap_or_else(|| first.formatted_address.clone()))
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

/// One ranked geocoding result.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResult {
    #[serde(default)]
    pub formatted_address: String,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<GeocodeResult> {
        serde_json::from_str::<GeocodeResponse>(json)
            .unwrap()
            .results
    }

    #[test]
    fn test_pick_label_prefers_locality() {
        let results = parse(
            r#"{"status":"OK","results":[{
                "formatted_address":"Trg 1, 5000 Nova Gorica, Slovenia",
                "address_components":[
                    {"long_name":"1","types":["street_number"]},
                    {"long_name":"Nova Gorica","types":["locality","political"]}
                ],
                "geometry":{"location":{"lat":45.95,"lng":13.64}}
            }]}"#,
        );
        assert_eq!(pick_label(&results).unwrap(), "Nova Gorica");
    }

    #[test]
    fn test_pick_label_falls_back_to_formatted_address() {
        let results = parse(
            r#"{"status":"OK","results":[{
                "formatted_address":"Triglav National Park, Slovenia",
                "address_components":[{"long_name":"Slovenia","types":["country"]}],
                "geometry":{"location":{"lat":46.37,"lng":13.83}}
            }]}"#,
        );
        assert_eq!(
            pick_label(&results).unwrap(),
            "Triglav National Park, Slovenia"
        );
    }

    #[test]
    fn test_pick_label_zero_results() {
        let results = parse(r#"{"status":"ZERO_RESULTS","results":[]}"#);
        assert!(matches!(pick_label(&results), Err(AppError::Geocode(_))));
    }
}
