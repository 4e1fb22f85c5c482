// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! The app runs against an offline database, so any request that gets past
//! authentication and request validation fails with a database error.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use tower::ServiceExt;

mod common;
use common::{create_test_app, create_test_jwt};

async fn send(app: axum::Router, request: Request<Body>) -> axum::response::Response {
    app.oneshot(request).await.unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = create_test_app();

    let response = send(
        app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Content-Type-Options").unwrap(),
        "nosniff"
    );
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_without_token() {
    let (app, _) = create_test_app();

    for (method, uri) in [
        (Method::GET, "/api/activities"),
        (Method::POST, "/api/diary/1/track"),
    ] {
        let response = send(
            app.clone(),
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"provider":"strava","activity_id":"1"}"#))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let (app, _) = create_test_app();
    let token = create_test_jwt(42, b"not_the_configured_signing_key!!");

    let response = send(
        app,
        Request::builder()
            .uri("/api/activities")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let (app, state) = create_test_app();
    let token = create_test_jwt(42, &state.config.jwt_signing_key);

    // Endomondo is not configured in the test app, so an authenticated
    // request fails with 400 without touching the database.
    let response = send(
        app,
        Request::builder()
            .uri("/api/activities?provider=endomondo")
            .header(header::COOKIE, format!("diary_token={}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_import_request_validated_before_lookup() {
    let (app, state) = create_test_app();
    let token = create_test_jwt(42, &state.config.jwt_signing_key);

    let response = send(
        app.clone(),
        Request::builder()
            .method(Method::POST)
            .uri("/api/diary/7/track")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"provider":"strava","activity_id":""}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/diary/7/track")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"provider":"garmin","activity_id":"1"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_map_is_public() {
    let (app, _) = create_test_app();

    let response = send(
        app,
        Request::builder().uri("/api/map").body(Body::empty()).unwrap(),
    )
    .await;

    // Past the auth layer; the offline database then fails the read.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "database_error");
}

#[tokio::test]
async fn test_map_ignores_bad_session() {
    let (app, _) = create_test_app();

    let response = send(
        app,
        Request::builder()
            .uri("/api/map")
            .header(header::COOKIE, "diary_token=garbage")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_track_points_bad_id() {
    let (app, _) = create_test_app();

    let response = send(
        app,
        Request::builder()
            .uri("/api/tracks/abc/points")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight_exposes_etag() {
    let (app, _) = create_test_app();

    let response = send(
        app,
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/map")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "if-none-match")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}
