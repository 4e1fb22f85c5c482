// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod endomondo;
pub mod filters;
pub mod geocode;
pub mod ingest;
pub mod map;
pub mod normalize;
pub mod strava;

pub use endomondo::EndomondoClient;
pub use filters::FilterSet;
pub use geocode::{Geocoder, GoogleGeocoder};
pub use ingest::{ActivitySource, Provider, SourceActivity};
pub use normalize::{DescendingCategories, ImportOutcome, TrackImporter};
pub use strava::{OAuthResult, StravaClient, StravaService};
