// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Unit conversions for provider data.
//!
//! Providers report metres and metres/second; tracks are stored in
//! kilometres and kilometres/hour.

pub const METERS_PER_KILOMETER: f64 = 1000.0;
pub const MPS_TO_KMH: f64 = 3.6;

pub fn meters_to_km(meters: f64) -> f64 {
    meters / METERS_PER_KILOMETER
}

pub fn mps_to_kmh(speed: f64) -> f64 {
    speed * MPS_TO_KMH
}
