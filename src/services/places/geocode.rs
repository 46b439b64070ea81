//! Geocoding client
//!
//! Resolves city and landmark names to coordinates. The landmark registry
//! short-circuits this for well-known entries; everything else pays one
//! HTTP call, cached by the provider stage.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::PlacesError;
use crate::config::PlacesConfig;
use crate::models::LatLng;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-text place name. `None` means the provider answered
    /// but found nothing.
    async fn geocode(&self, query: &str, region: Option<&str>)
    -> Result<Option<LatLng>, PlacesError>;
}

pub struct GeocodeClient {
    http_client: Client,
    config: PlacesConfig,
}

impl GeocodeClient {
    pub fn new(config: PlacesConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("Failed to create HTTP client");
        Self { http_client, config }
    }
}

#[async_trait]
impl Geocoder for GeocodeClient {
    async fn geocode(
        &self,
        query: &str,
        region: Option<&str>,
    ) -> Result<Option<LatLng>, PlacesError> {
        let url = format!("{}/json", self.config.geocode_base.trim_end_matches('/'));
        let mut request = self
            .http_client
            .get(&url)
            .query(&[("address", query), ("key", &self.config.api_key)]);
        if let Some(region) = region {
            request = request.query(&[("region", region)]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PlacesError::Timeout(self.config.timeout_ms)
            } else {
                PlacesError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlacesError::Geocode(format!("HTTP {status}")));
        }

        let wire: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| PlacesError::Parse(e.to_string()))?;

        match wire.status.as_str() {
            "OK" => Ok(wire
                .results
                .into_iter()
                .next()
                .map(|r| LatLng::new(r.geometry.location.lat, r.geometry.location.lng))),
            "ZERO_RESULTS" => Ok(None),
            "OVER_QUERY_LIMIT" => Err(PlacesError::Quota),
            other => Err(PlacesError::Geocode(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geocode_response_parses() {
        let raw = r#"{
            "status": "OK",
            "results": [{"geometry": {"location": {"lat": 31.8090, "lng": 34.7748}}}]
        }"#;
        let wire: GeocodeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(wire.status, "OK");
        assert_eq!(wire.results[0].geometry.location.lat, 31.8090);
    }

    #[test]
    fn zero_results_parse() {
        let raw = r#"{"status": "ZERO_RESULTS", "results": []}"#;
        let wire: GeocodeResponse = serde_json::from_str(raw).unwrap();
        assert!(wire.results.is_empty());
    }
}
