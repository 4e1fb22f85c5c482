// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Track import tests with in-memory providers and geocoder.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use trail_diary::error::AppError;
use trail_diary::middleware::auth::AuthUser;
use trail_diary::models::{decode_points, Track, TrackPoint};
use trail_diary::services::{
    ActivitySource, DescendingCategories, Geocoder, ImportOutcome, Provider, SourceActivity,
    TrackImporter,
};

const USER: AuthUser = AuthUser { user_id: 7 };

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 7, 14, 8, 0, 0).unwrap()
}

fn point(secs: i64, lat: f64, lon: f64, dist: f64) -> TrackPoint {
    TrackPoint {
        time: t0() + ChronoDuration::seconds(secs),
        latitude: lat,
        longitude: lon,
        elevation: Some(500.0 + dist * 10.0),
        distance: dist,
    }
}

/// Serves one canned activity and counts fetches.
struct FakeSource {
    provider: Provider,
    activity_type: String,
    points: Vec<TrackPoint>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn new(provider: Provider, activity_type: &str, points: Vec<TrackPoint>) -> Self {
        Self {
            provider,
            activity_type: activity_type.to_string(),
            points,
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ActivitySource for FakeSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch_activity(
        &self,
        _principal: &AuthUser,
        activity_id: &str,
    ) -> Result<SourceActivity, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(SourceActivity {
            id: activity_id.to_string(),
            name: "Over the pass".to_string(),
            activity_type: self.activity_type.clone(),
            start_time: t0(),
            total_distance_km: 12.5,
            elapsed_time_secs: 5400.0,
            average_speed_kmh: 8.3,
            points: self.points.clone(),
        })
    }
}

/// Labels every coordinate with its rounded latitude.
#[derive(Default)]
struct FakeGeocoder {
    calls: AtomicUsize,
}

impl FakeGeocoder {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Geocoder for FakeGeocoder {
    async fn reverse(&self, lat: f64, _lon: f64) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("place-{:.1}", lat))
    }

    async fn forward(&self, _address: &str) -> Result<(f64, f64), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((46.5, 14.5))
    }
}

fn importer(timeout: Duration) -> TrackImporter<FakeGeocoder> {
    TrackImporter::new(
        FakeGeocoder::default(),
        DescendingCategories::from_config(&[
            "strava:Ride".to_string(),
            "endomondo:3".to_string(),
        ]),
        timeout,
    )
}

fn climb() -> Vec<TrackPoint> {
    vec![
        point(0, 46.1, 14.1, 0.0),
        point(600, 46.2, 14.2, 4.0),
        point(1800, 46.3, 14.3, 12.5),
    ]
}

fn existing_track(source_workout_id: &str) -> Track {
    Track {
        id: 99,
        start_label: "Old start".to_string(),
        end_label: "Old end".to_string(),
        date: t0(),
        length: 1.0,
        duration: 60.0,
        avg_speed: 60.0,
        source_workout_id: source_workout_id.to_string(),
        data: "[]".to_string(),
        map_url: String::new(),
        updated_at: t0(),
    }
}

#[tokio::test]
async fn test_reimport_of_same_activity_is_skipped() {
    let importer = importer(Duration::from_secs(5));
    let source = FakeSource::new(Provider::Strava, "Hike", climb());
    let existing = existing_track("strava:555");

    let outcome = importer
        .import(&source, &USER, 99, Some(&existing), "555")
        .await
        .unwrap();

    assert!(outcome.is_unchanged());
    assert_eq!(outcome.track().start_label, "Old start");
    assert_eq!(source.fetches(), 0);
    assert_eq!(importer.geocoder().calls(), 0);
}

#[tokio::test]
async fn test_other_activity_replaces_track() {
    let importer = importer(Duration::from_secs(5));
    let source = FakeSource::new(Provider::Strava, "Hike", climb());
    let existing = existing_track("strava:555");

    let outcome = importer
        .import(&source, &USER, 99, Some(&existing), "556")
        .await
        .unwrap();

    assert!(matches!(outcome, ImportOutcome::Imported(_)));
    let track = outcome.into_track();
    assert_eq!(track.id, 99);
    assert_eq!(track.source_workout_id, "strava:556");
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_same_id_from_other_provider_is_not_skipped() {
    let importer = importer(Duration::from_secs(5));
    let source = FakeSource::new(Provider::Endomondo, "0", climb());
    let existing = existing_track("strava:1-2");

    let outcome = importer
        .import(&source, &USER, 99, Some(&existing), "1-2")
        .await
        .unwrap();

    assert_eq!(outcome.track().source_workout_id, "endomondo:1-2");
}

#[tokio::test]
async fn test_invalid_fixes_are_dropped() {
    let importer = importer(Duration::from_secs(5));
    let mut points = climb();
    points.insert(1, point(300, 0.0, 14.15, 2.0));
    points.push(point(2000, 46.35, 0.0, 13.0));
    let source = FakeSource::new(Provider::Strava, "Hike", points);

    let track = importer
        .import(&source, &USER, 1, None, "42")
        .await
        .unwrap()
        .into_track();

    let stored = decode_points(&track.data).unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|p| p.latitude != 0.0 && p.longitude != 0.0));
}

#[tokio::test]
async fn test_summary_and_labels() {
    let importer = importer(Duration::from_secs(5));
    let source = FakeSource::new(Provider::Strava, "Hike", climb());

    let track = importer
        .import(&source, &USER, 3, None, "42")
        .await
        .unwrap()
        .into_track();

    assert_eq!(track.start_label, "place-46.1");
    assert_eq!(track.end_label, "place-46.3");
    assert_eq!(track.date, t0());
    assert_eq!(track.length, 12.5);
    assert_eq!(track.duration, 5400.0);
    assert_eq!(track.avg_speed, 8.3);
    assert!(!track.map_url.is_empty());
    assert_eq!(importer.geocoder().calls(), 2);
}

#[tokio::test]
async fn test_descending_ride_is_reversed() {
    let importer = importer(Duration::from_secs(5));
    let source = FakeSource::new(Provider::Strava, "Ride", climb());

    let track = importer
        .import(&source, &USER, 3, None, "42")
        .await
        .unwrap()
        .into_track();

    let stored = decode_points(&track.data).unwrap();
    let lats: Vec<f64> = stored.iter().map(|p| p.latitude).collect();
    assert_eq!(lats, vec![46.3, 46.2, 46.1]);

    let dists: Vec<f64> = stored.iter().map(|p| p.distance).collect();
    assert_eq!(dists, vec![0.0, 8.5, 12.5]);

    let secs: Vec<i64> = stored.iter().map(|p| (p.time - t0()).num_seconds()).collect();
    assert_eq!(secs, vec![0, 1200, 1800]);

    assert_eq!(track.start_label, "place-46.3");
    assert_eq!(track.end_label, "place-46.1");
}

#[tokio::test]
async fn test_run_keeps_recording_order() {
    let importer = importer(Duration::from_secs(5));
    let source = FakeSource::new(Provider::Strava, "Run", climb());

    let track = importer
        .import(&source, &USER, 3, None, "42")
        .await
        .unwrap()
        .into_track();

    assert_eq!(decode_points(&track.data).unwrap(), climb());
}

#[tokio::test]
async fn test_endomondo_sport_code_reversed() {
    let importer = importer(Duration::from_secs(5));
    let source = FakeSource::new(Provider::Endomondo, "3", climb());

    let track = importer
        .import(&source, &USER, 3, None, "1-2")
        .await
        .unwrap()
        .into_track();

    assert_eq!(track.start_label, "place-46.3");
}

#[tokio::test]
async fn test_no_valid_points_is_data_shape_error() {
    let importer = importer(Duration::from_secs(5));
    let source = FakeSource::new(
        Provider::Strava,
        "Hike",
        vec![point(0, 0.0, 0.0, 0.0), point(10, 0.0, 14.0, 0.1)],
    );

    let err = importer
        .import(&source, &USER, 3, None, "42")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DataShape(_)), "{:?}", err);
    assert_eq!(importer.geocoder().calls(), 0);
}

#[tokio::test]
async fn test_slow_provider_is_canceled() {
    let importer = importer(Duration::from_millis(20));
    let mut source = FakeSource::new(Provider::Strava, "Hike", climb());
    source.delay = Some(Duration::from_secs(5));

    let err = importer
        .import(&source, &USER, 3, None, "42")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Canceled(_)), "{:?}", err);
    assert_eq!(importer.geocoder().calls(), 0);
}

/// Geocoder whose service is down; counts attempts.
#[derive(Default)]
struct FailingGeocoder {
    calls: AtomicUsize,
}

impl Geocoder for FailingGeocoder {
    async fn reverse(&self, _lat: f64, _lon: f64) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Geocode("OVER_QUERY_LIMIT".to_string()))
    }

    async fn forward(&self, _address: &str) -> Result<(f64, f64), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Geocode("OVER_QUERY_LIMIT".to_string()))
    }
}

#[tokio::test]
async fn test_geocoder_failure_aborts_without_retry() {
    let importer = TrackImporter::new(
        FailingGeocoder::default(),
        DescendingCategories::default(),
        Duration::from_secs(5),
    );
    let source = FakeSource::new(Provider::Strava, "Hike", climb());

    let err = importer
        .import(&source, &USER, 3, None, "42")
        .await
        .unwrap_err();

    match err {
        AppError::Geocode(msg) => assert_eq!(msg, "OVER_QUERY_LIMIT"),
        other => panic!("expected Geocode, got {:?}", other),
    }
    // The first label fails and the end label is never asked for.
    assert_eq!(importer.geocoder().calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.fetches(), 1);
}
