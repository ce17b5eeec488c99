//! Delivery zone checks: geocoding and straight-line distance
//!
//! The dialogue only needs one question answered: is this address within the
//! delivery radius of the restaurant? Geocoding sits behind the [`Geocoder`]
//! trait so the checkout machine can be driven by a fixture in tests.

use crate::config::GeoConfig;
use crate::errors::{error_logging, AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const USER_AGENT: &str = concat!("hubsy-bot/", env!("CARGO_PKG_VERSION"));

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Great-circle distance in kilometres (haversine)
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Resolves a free-form address to coordinates; `None` means unknown address
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, address: &str) -> AppResult<Option<GeoPoint>>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Nominatim-backed geocoder scoped to the configured city
pub struct NominatimGeocoder {
    http: reqwest::Client,
    city: String,
}

impl NominatimGeocoder {
    pub fn new(http: reqwest::Client, config: &GeoConfig) -> Self {
        Self {
            http,
            city: config.city.clone(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn locate(&self, address: &str) -> AppResult<Option<GeoPoint>> {
        // Users type street addresses without the city; scope the query.
        let query = if address.to_lowercase().contains(&self.city.to_lowercase()) {
            address.to_string()
        } else {
            format!("{}, {}", address, self.city)
        };

        let places: Vec<NominatimPlace> = self
            .http
            .get(NOMINATIM_URL)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                error_logging::log_network_error(&e, "geocode", Some(NOMINATIM_URL));
                AppError::Internal(format!("geocoding failed: {}", e))
            })?
            .json()
            .await
            .map_err(|e| {
                error_logging::log_network_error(&e, "geocode_decode", Some(NOMINATIM_URL));
                AppError::Internal(format!("geocoding response malformed: {}", e))
            })?;

        let Some(place) = places.first() else {
            debug!(query = %query, "Geocoder found no match");
            return Ok(None);
        };

        let (Ok(lat), Ok(lon)) = (place.lat.parse::<f64>(), place.lon.parse::<f64>()) else {
            return Ok(None);
        };

        Ok(Some(GeoPoint { lat, lon }))
    }
}

/// Is the point within the configured delivery radius of the restaurant
pub fn within_delivery_zone(config: &GeoConfig, point: GeoPoint) -> bool {
    let restaurant = GeoPoint {
        lat: config.restaurant_lat,
        lon: config.restaurant_lon,
    };
    distance_km(restaurant, point) <= config.delivery_radius_km
}
