// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Response header middleware.

use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Baseline hardening headers for every response.
pub async fn add_security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

/// Revalidation headers for etag-tagged map responses.
///
/// The map payload differs per viewer, so shared caches must key on the
/// session cookie and always revalidate.
pub async fn add_revalidation_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if headers.contains_key(header::ETAG) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(
            header::VARY,
            HeaderValue::from_static("Cookie, Authorization"),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_security_headers() {
        let app = Router::new()
            .route("/", get(|| async { "Hello" }))
            .layer(axum::middleware::from_fn(add_security_headers));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(
            headers.get("Referrer-Policy").unwrap(),
            "strict-origin-when-cross-origin"
        );
    }

    #[tokio::test]
    async fn test_revalidation_headers_only_with_etag() {
        let app = Router::new()
            .route("/tagged", get(|| async { ([(header::ETAG, "\"abc\"")], "x") }))
            .route("/plain", get(|| async { "x" }))
            .layer(axum::middleware::from_fn(add_revalidation_headers));

        let tagged = app
            .clone()
            .oneshot(Request::builder().uri("/tagged").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(tagged.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(
            tagged.headers().get(header::VARY).unwrap(),
            "Cookie, Authorization"
        );

        let plain = app
            .oneshot(Request::builder().uri("/plain").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(plain.headers().get(header::CACHE_CONTROL).is_none());
    }
}
