// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication tests.
//!
//! Tokens issued by the OAuth callback must be accepted by the auth
//! middleware, and anything else rejected.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use trail_diary::middleware::auth::{create_jwt, verify_jwt, AuthUser, Claims, SESSION_TTL_SECS};

const KEY: &[u8] = b"test_signing_key_32_bytes_long!!";

#[test]
fn test_issued_token_claims() {
    let token = create_jwt(12345678, KEY).unwrap();

    let data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(KEY),
        &Validation::new(Algorithm::HS256),
    )
    .expect("Failed to decode JWT - check Claims struct compatibility");

    assert_eq!(data.claims.sub, "12345678");
    assert_eq!(data.claims.exp - data.claims.iat, SESSION_TTL_SECS);
}

#[test]
fn test_issued_token_verifies() {
    let token = create_jwt(98765432, KEY).unwrap();
    assert_eq!(
        verify_jwt(&token, KEY),
        Some(AuthUser {
            user_id: 98765432
        })
    );
}

#[test]
fn test_expired_token_rejected() {
    let claims = Claims {
        sub: "1".to_string(),
        iat: 1_000_000,
        exp: 1_000_100,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(KEY),
    )
    .unwrap();

    assert_eq!(verify_jwt(&token, KEY), None);
}

#[test]
fn test_non_numeric_subject_rejected() {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "athlete".to_string(),
        iat: now,
        exp: now + 3600,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(KEY),
    )
    .unwrap();

    assert_eq!(verify_jwt(&token, KEY), None);
}

#[test]
fn test_other_algorithm_rejected() {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "1".to_string(),
        iat: now,
        exp: now + 3600,
    };
    let token = encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(KEY),
    )
    .unwrap();

    assert_eq!(verify_jwt(&token, KEY), None);
}
