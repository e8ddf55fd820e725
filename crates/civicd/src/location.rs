//! Street-address extraction and geocoding.
//!
//! Extraction is regex based and tuned for how residents write: an
//! intersection ("Main Street and King Street"), a numbered address
//! ("123 Main Street"), or a bare street name. Whatever matches gets
//! the city suffix appended and handed to the geocoder. Both stages are
//! best effort; a case files fine without coordinates.

use anyhow::{Context, Result};
use civic_common::types::GeoPoint;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const STREET_SUFFIXES: &str = "road|street|avenue|blvd|drive|lane|way|court|place";
const CITY_SUFFIX: &str = "Toronto, ON";

const GEOCODE_TIMEOUT_SECS: u64 = 5;
const GEOCODER_USER_AGENT: &str = "civic311/2.0";

static INTERSECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:at |near )?([A-Z][a-zA-Z\s]+(?:{s}))\s+(?:and|&|at)\s+([A-Z][a-zA-Z\s]+(?:{s}))",
        s = STREET_SUFFIXES
    ))
    .expect("intersection pattern")
});

static NUMBERED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d+)\s+([A-Z][a-zA-Z\s]+(?:{s}))\b",
        s = STREET_SUFFIXES
    ))
    .expect("numbered address pattern")
});

static BARE_STREET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b([A-Z][a-zA-Z\s]+(?:{s}))\b",
        s = STREET_SUFFIXES
    ))
    .expect("street pattern")
});

/// Pull a mappable street address out of free text, most specific
/// pattern first.
pub fn extract_street_address(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = INTERSECTION_RE.captures(text) {
        let street1 = caps[1].trim();
        let street2 = caps[2].trim();
        let address = format!("{street1} and {street2}, {CITY_SUFFIX}");
        info!("extracted intersection: {address}");
        return Some(address);
    }

    if let Some(caps) = NUMBERED_RE.captures(text) {
        let number = &caps[1];
        let street = caps[2].trim();
        let address = format!("{number} {street}, {CITY_SUFFIX}");
        info!("extracted address: {address}");
        return Some(address);
    }

    if let Some(caps) = BARE_STREET_RE.captures(text) {
        let street = caps[1].trim();
        let address = format!("{street}, {CITY_SUFFIX}");
        info!("extracted street: {address}");
        return Some(address);
    }

    warn!("no street address found in description");
    None
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

/// Coordinates travel as strings on the Nominatim wire; a place whose
/// lat or lon fails to parse is no fix at all.
fn first_place_to_point(places: Vec<NominatimPlace>) -> Option<GeoPoint> {
    let place = places.into_iter().next()?;
    let latitude: f64 = place.lat.parse().ok()?;
    let longitude: f64 = place.lon.parse().ok()?;
    Some(GeoPoint {
        latitude,
        longitude,
        address: place.display_name,
    })
}

/// Forward geocoder backed by a Nominatim-compatible service.
pub struct Geocoder {
    client: reqwest::Client,
    base_url: String,
}

impl Geocoder {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GEOCODE_TIMEOUT_SECS))
            .user_agent(GEOCODER_USER_AGENT)
            .build()
            .context("building geocoder http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve an address to coordinates. Every failure mode (timeout,
    /// bad status, empty result, unparseable coordinates) is `None`.
    pub async fn geocode(&self, address: &str) -> Option<GeoPoint> {
        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", address), ("format", "json"), ("limit", "1")]);

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("geocoding error for {address}: {err}");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("geocoding error for {address}: HTTP {}", response.status());
            return None;
        }

        let places: Vec<NominatimPlace> = match response.json().await {
            Ok(places) => places,
            Err(err) => {
                warn!("geocoding returned unparseable body for {address}: {err}");
                return None;
            }
        };

        match first_place_to_point(places) {
            Some(point) => {
                info!(
                    "geocoded: {address} -> ({}, {})",
                    point.latitude, point.longitude
                );
                Some(point)
            }
            None => {
                warn!("no geocoding results for: {address}");
                None
            }
        }
    }
}
