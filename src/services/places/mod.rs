//! Places provider client
//!
//! Executes text and nearby searches against the places API and normalises
//! every result into the internal [`Place`] record at this boundary. The
//! trait seam exists so the pipeline and tests can run against a stub
//! provider.

pub mod geocode;

pub use geocode::{GeocodeClient, Geocoder};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::PlacesConfig;
use crate::models::{LatLng, OpenPeriod, OpeningHours, Place};

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("places call timed out after {0}ms")]
    Timeout(u64),

    #[error("places network error: {0}")]
    Network(String),

    #[error("places quota exhausted")]
    Quota,

    #[error("places API error {status}: {message}")]
    BadResponse { status: u16, message: String },

    #[error("places response parse error: {0}")]
    Parse(String),

    #[error("geocoding failed: {0}")]
    Geocode(String),
}

// ============================================================================
// Outbound call bodies
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CircleArea {
    pub center: WireLatLng,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireLatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<LatLng> for WireLatLng {
    fn from(l: LatLng) -> Self {
        Self { latitude: l.lat, longitude: l.lng }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationBias {
    pub circle: CircleArea,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextSearchBody {
    pub text_query: String,
    pub language_code: String,
    pub region_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_bias: Option<LocationBias>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NearbySearchBody {
    pub location_restriction: LocationBias,
    pub included_types: Vec<String>,
    pub language_code: String,
    pub region_code: String,
    pub rank_preference: String,
}

// ============================================================================
// Provider trait
// ============================================================================

#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn text_search(&self, body: &TextSearchBody) -> Result<Vec<Place>, PlacesError>;

    async fn nearby_search(&self, body: &NearbySearchBody) -> Result<Vec<Place>, PlacesError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

const FIELD_MASK: &str = "places.id,places.displayName,places.types,places.formattedAddress,places.location,places.rating,places.userRatingCount,places.priceLevel,places.currentOpeningHours";

pub struct PlacesClient {
    http_client: Client,
    config: PlacesConfig,
}

impl PlacesClient {
    pub fn new(config: PlacesConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("Failed to create HTTP client");
        Self { http_client, config }
    }

    async fn call(&self, path: &str, body: serde_json::Value) -> Result<Vec<Place>, PlacesError> {
        let url = format!("{}/{}", self.config.api_base.trim_end_matches('/'), path);
        let timeout_ms = self.config.timeout_ms;

        let response = self
            .http_client
            .post(&url)
            .header("X-Goog-Api-Key", &self.config.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlacesError::Timeout(timeout_ms)
                } else {
                    PlacesError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PlacesError::Quota);
        }
        if !status.is_success() {
            // Parseable-but-failed responses are failures too; a partial
            // body must never reach the caches.
            let message = response.text().await.unwrap_or_default();
            return Err(PlacesError::BadResponse { status: status.as_u16(), message });
        }

        let wire: SearchResponse = response
            .json()
            .await
            .map_err(|e| PlacesError::Parse(e.to_string()))?;
        Ok(wire.places.into_iter().map(normalize_place).collect())
    }
}

#[async_trait]
impl PlacesProvider for PlacesClient {
    async fn text_search(&self, body: &TextSearchBody) -> Result<Vec<Place>, PlacesError> {
        let body =
            serde_json::to_value(body).map_err(|e| PlacesError::Parse(e.to_string()))?;
        self.call("places:searchText", body).await
    }

    async fn nearby_search(&self, body: &NearbySearchBody) -> Result<Vec<Place>, PlacesError> {
        let body =
            serde_json::to_value(body).map_err(|e| PlacesError::Parse(e.to_string()))?;
        self.call("places:searchNearby", body).await
    }
}

// ============================================================================
// Wire response and normalisation
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    places: Vec<WirePlace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePlace {
    id: String,
    #[serde(default)]
    display_name: Option<WireDisplayName>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    location: Option<WireLatLng>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_rating_count: Option<u32>,
    #[serde(default)]
    price_level: Option<serde_json::Value>,
    #[serde(default)]
    current_opening_hours: Option<WireOpeningHours>,
}

#[derive(Debug, Deserialize)]
struct WireDisplayName {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOpeningHours {
    #[serde(default)]
    open_now: Option<bool>,
    #[serde(default)]
    periods: Vec<WirePeriod>,
}

#[derive(Debug, Deserialize)]
struct WirePeriod {
    #[serde(default)]
    open: Option<WirePoint>,
    #[serde(default)]
    close: Option<WirePoint>,
}

#[derive(Debug, Deserialize)]
struct WirePoint {
    #[serde(default)]
    day: u8,
    #[serde(default)]
    hour: u16,
    #[serde(default)]
    minute: u16,
}

/// Providers report price level as either an enum string or a bare number.
fn parse_price_level(raw: Option<serde_json::Value>) -> Option<u8> {
    match raw? {
        serde_json::Value::Number(n) => {
            let n = n.as_u64()?;
            (1..=4).contains(&n).then_some(n as u8)
        }
        serde_json::Value::String(s) => match s.as_str() {
            "PRICE_LEVEL_INEXPENSIVE" => Some(1),
            "PRICE_LEVEL_MODERATE" => Some(2),
            "PRICE_LEVEL_EXPENSIVE" => Some(3),
            "PRICE_LEVEL_VERY_EXPENSIVE" => Some(4),
            _ => None,
        },
        _ => None,
    }
}

fn normalize_place(wire: WirePlace) -> Place {
    let opening_hours = wire.current_opening_hours.map(|hours| OpeningHours {
        open_now: hours.open_now,
        periods: hours
            .periods
            .into_iter()
            .filter_map(|p| {
                let open = p.open?;
                let close = p.close?;
                Some(OpenPeriod {
                    day: open.day,
                    open_minute: open.hour * 60 + open.minute,
                    close_minute: close.hour * 60 + close.minute,
                })
            })
            .collect(),
    });

    Place {
        place_id: wire.id,
        name: wire.display_name.map(|d| d.text).unwrap_or_default(),
        types: wire.types,
        address: wire.formatted_address,
        lat_lng: wire.location.map(|l| LatLng::new(l.latitude, l.longitude)),
        rating: wire.rating.filter(|r| (0.0..=5.0).contains(r)),
        user_ratings_total: wire.user_rating_count,
        price_level: parse_price_level(wire.price_level),
        opening_hours,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_search_body_serialises_to_provider_shape() {
        let body = TextSearchBody {
            text_query: "איטלקי בגדרה".to_string(),
            language_code: "he".to_string(),
            region_code: "IL".to_string(),
            location_bias: Some(LocationBias {
                circle: CircleArea {
                    center: WireLatLng { latitude: 31.809, longitude: 34.7748 },
                    radius: 10_000.0,
                },
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["textQuery"], "איטלקי בגדרה");
        assert_eq!(value["languageCode"], "he");
        assert_eq!(value["locationBias"]["circle"]["radius"], 10_000.0);
    }

    #[test]
    fn nearby_body_carries_rank_preference() {
        let body = NearbySearchBody {
            location_restriction: LocationBias {
                circle: CircleArea {
                    center: WireLatLng { latitude: 32.0853, longitude: 34.7818 },
                    radius: 800.0,
                },
            },
            included_types: vec!["italian_restaurant".to_string(), "restaurant".to_string()],
            language_code: "en".to_string(),
            region_code: "IL".to_string(),
            rank_preference: "DISTANCE".to_string(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["rankPreference"], "DISTANCE");
        assert_eq!(value["includedTypes"][0], "italian_restaurant");
    }

    #[test]
    fn normalisation_maps_wire_fields() {
        let wire: WirePlace = serde_json::from_value(json!({
            "id": "place-1",
            "displayName": {"text": "Trattoria Roma"},
            "types": ["italian_restaurant", "restaurant"],
            "formattedAddress": "Herzl 1, Gedera",
            "location": {"latitude": 31.81, "longitude": 34.77},
            "rating": 4.4,
            "userRatingCount": 230,
            "priceLevel": "PRICE_LEVEL_MODERATE",
            "currentOpeningHours": {
                "openNow": true,
                "periods": [
                    {"open": {"day": 1, "hour": 9, "minute": 0}, "close": {"day": 1, "hour": 22, "minute": 30}}
                ]
            }
        }))
        .unwrap();

        let place = normalize_place(wire);
        assert_eq!(place.place_id, "place-1");
        assert_eq!(place.name, "Trattoria Roma");
        assert_eq!(place.price_level, Some(2));
        assert_eq!(place.open_now(), Some(true));
        let hours = place.opening_hours.unwrap();
        assert_eq!(hours.periods[0].close_minute, 22 * 60 + 30);
    }

    #[test]
    fn missing_attributes_stay_missing() {
        let wire: WirePlace =
            serde_json::from_value(json!({"id": "bare", "displayName": {"text": "Bare"}}))
                .unwrap();
        let place = normalize_place(wire);
        assert!(place.rating.is_none());
        assert!(place.user_ratings_total.is_none());
        assert!(place.price_level.is_none());
        assert!(place.opening_hours.is_none());
    }

    #[test]
    fn price_level_parses_both_wire_forms() {
        assert_eq!(parse_price_level(Some(json!("PRICE_LEVEL_EXPENSIVE"))), Some(3));
        assert_eq!(parse_price_level(Some(json!(2))), Some(2));
        assert_eq!(parse_price_level(Some(json!("PRICE_LEVEL_FREE"))), None);
        assert_eq!(parse_price_level(Some(json!(9))), None);
        assert_eq!(parse_price_level(None), None);
    }
}
