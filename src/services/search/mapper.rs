//! Route mapping stage
//!
//! Turns a classified intent into a concrete provider call plan. The LLM
//! drafts terms and radii; everything that must be deterministic is imposed
//! afterwards: the canonical text query, the cuisine key (the extractor
//! wins over anything the model said), the bias rule where an explicit city
//! strictly outranks the user's location, landmark-registry resolution, and
//! the provider language, which is always the resolved search language.

use serde_json::json;
use std::sync::Arc;

use super::SearchError;
use super::canonical::{self, canonical_cache_key};
use super::landmarks::LandmarkRegistry;
use crate::models::{
    CircleBias, LandmarkPlan, LanguageContext, LatLng, Mapping, NearbyPlan, Route, Strictness,
    TextSearchPlan,
};
use crate::services::cache::TieredCache;
use crate::services::llm::ScenarioRunner;
use crate::services::llm::scenarios::intent::IntentResult;
use crate::services::llm::scenarios::route_mapper::{
    LandmarkMapRequest, LandmarkMapResponse, NearbyMapRequest, NearbyMapResponse,
    QueryRewriteRequest, QueryRewriteResponse, TextSearchMapRequest, TextSearchMapResponse,
};
use crate::services::places::Geocoder;
use crate::utils::hash::short_hash;

/// Bias radius around an explicitly mentioned city.
const CITY_BIAS_RADIUS_M: f64 = 10_000.0;

/// Bias radius around the user's own location.
const USER_BIAS_RADIUS_M: f64 = 20_000.0;

/// The bias radius a text-search plan will end up with, computable from the
/// intent alone. The reuse decision compares this against a prior pool's
/// radius before any mapping work happens, so the comparison has to be
/// derivable without the mapper model.
pub fn planned_bias_radius(has_city: bool, has_user_location: bool) -> f64 {
    if has_city {
        CITY_BIAS_RADIUS_M
    } else if has_user_location {
        USER_BIAS_RADIUS_M
    } else {
        0.0
    }
}

/// Confidence a cached LLM rewrite needs before it replaces the
/// deterministic canonical form.
const REWRITE_CONFIDENCE_GATE: f64 = 0.7;

const NEARBY_RADIUS_RANGE: (f64, f64) = (300.0, 5_000.0);
const NEARBY_RADIUS_DEFAULT: f64 = 1_500.0;
const LANDMARK_RADIUS_RANGE: (f64, f64) = (300.0, 3_000.0);
const LANDMARK_RADIUS_DEFAULT: f64 = 500.0;

/// Region used when neither the intent nor the request carried one.
const FALLBACK_REGION: &str = "IL";

pub struct RouteMapper {
    llm: Arc<ScenarioRunner>,
    geocoder: Arc<dyn Geocoder>,
    registry: Arc<LandmarkRegistry>,
    cache: Arc<TieredCache>,
    canonical_ttl_s: u64,
}

/// Everything the mapper needs from the stages before it.
pub struct MappingInputs<'a> {
    pub query: &'a str,
    pub intent: &'a IntentResult,
    pub language_context: &'a LanguageContext,
    pub user_location: Option<LatLng>,
}

/// The plan plus the geocoded city center, which distance-origin selection
/// needs downstream.
pub struct MappingOutput {
    pub mapping: Mapping,
    pub city_center: Option<LatLng>,
}

impl RouteMapper {
    pub fn new(
        llm: Arc<ScenarioRunner>,
        geocoder: Arc<dyn Geocoder>,
        registry: Arc<LandmarkRegistry>,
        cache: Arc<TieredCache>,
        canonical_ttl_s: u64,
    ) -> Self {
        Self { llm, geocoder, registry, cache, canonical_ttl_s }
    }

    pub async fn map(&self, inputs: MappingInputs<'_>) -> Result<MappingOutput, SearchError> {
        match inputs.intent.route {
            Route::TextSearch => self.map_text_search(&inputs).await,
            Route::Nearby => self.map_nearby(&inputs).await,
            Route::Landmark => self.map_landmark(&inputs).await,
        }
    }

    /// Preflight hook: prime the city geocode cache while the filter
    /// stages are still running, so the mapper's own lookup is a hit.
    pub async fn warm_city_geocode(&self, city: &str, region_code: &str) {
        let _ = self.geocode_city(city, region_code).await;
    }

    fn region_code(&self, inputs: &MappingInputs<'_>, llm_region: Option<&str>) -> String {
        inputs
            .intent
            .region
            .clone()
            .or_else(|| {
                crate::services::llm::scenarios::intent::validate_region(llm_region)
            })
            .unwrap_or_else(|| FALLBACK_REGION.to_string())
    }

    // ------------------------------------------------------------------
    // Text search
    // ------------------------------------------------------------------

    async fn map_text_search(
        &self,
        inputs: &MappingInputs<'_>,
    ) -> Result<MappingOutput, SearchError> {
        let request = TextSearchMapRequest {
            query: inputs.query.to_string(),
            city_text: inputs.intent.city_text.clone(),
            region_hint: inputs.intent.region.clone(),
        };
        let response: TextSearchMapResponse = self
            .llm
            .call(&request, self.llm.timeouts().mapper_ms)
            .await
            .map_err(|e| SearchError::MapperFailed(e.to_string()))?;

        let region_code = self.region_code(inputs, response.region.as_deref());
        let cuisine_key = canonical::extract_cuisine_key(inputs.query).map(str::to_string);
        let text_query = self
            .canonical_text_query(inputs, response.text_query.as_deref(), &region_code)
            .await;

        // Bias selection. An explicit, geocodable city always outranks the
        // user's own location.
        let mut city_center = None;
        let location_bias = if let Some(city) = inputs.intent.city_text.as_deref() {
            city_center = self.geocode_city(city, &region_code).await;
            city_center
                .map(|center| CircleBias { center, radius_meters: CITY_BIAS_RADIUS_M })
                .or_else(|| {
                    inputs
                        .user_location
                        .map(|center| CircleBias { center, radius_meters: USER_BIAS_RADIUS_M })
                })
        } else {
            inputs
                .user_location
                .map(|center| CircleBias { center, radius_meters: USER_BIAS_RADIUS_M })
        };

        let strictness = match response.strictness.as_deref().map(str::to_uppercase).as_deref() {
            Some("STRICT") => Strictness::Strict,
            _ => Strictness::RelaxIfEmpty,
        };

        let plan = TextSearchPlan {
            text_query,
            region_code,
            search_language: inputs.language_context.search_language,
            location_bias,
            required_terms: response.required_terms,
            preferred_terms: response.preferred_terms,
            strictness,
            type_hint: response.type_hint,
            cuisine_key,
        };

        Ok(MappingOutput { mapping: Mapping::TextSearch(plan), city_center })
    }

    /// Deterministic canonical form, optionally replaced by a cached LLM
    /// rewrite when the model is confident. Rewrite failures never fail the
    /// stage.
    async fn canonical_text_query(
        &self,
        inputs: &MappingInputs<'_>,
        llm_text_query: Option<&str>,
        region_code: &str,
    ) -> String {
        let deterministic = canonical::canonicalize_text_query(
            inputs.query,
            inputs.intent.city_text.as_deref(),
            inputs.language_context.query_language,
        );
        if !deterministic.is_empty() && deterministic != crate::utils::normalize_query(inputs.query)
        {
            // The extractor recognised the query; its form is stable and
            // needs no model help.
            return deterministic;
        }

        let fallback = llm_text_query
            .map(str::to_string)
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(deterministic);

        let key = canonical_cache_key(
            &short_hash(&crate::utils::normalize_query(inputs.query)),
            inputs.language_context.ui_language.as_str(),
            region_code,
        );
        let llm = self.llm.clone();
        let query = inputs.query.to_string();
        let rewritten = self
            .cache
            .get_or_fetch(&key, self.canonical_ttl_s, || async move {
                let response: QueryRewriteResponse = llm
                    .call(
                        &QueryRewriteRequest { query },
                        llm.timeouts().mapper_ms,
                    )
                    .await?;
                Ok(json!({
                    "canonical": response.canonical,
                    "confidence": response.confidence.unwrap_or(0.0),
                }))
            })
            .await;

        match rewritten {
            Ok(value) => {
                let confidence = value["confidence"].as_f64().unwrap_or(0.0);
                let canonical = value["canonical"].as_str().unwrap_or_default();
                if confidence >= REWRITE_CONFIDENCE_GATE && !canonical.is_empty() {
                    canonical.to_string()
                } else {
                    fallback
                }
            }
            Err(e) => {
                tracing::debug!("canonical rewrite unavailable: {}", e);
                fallback
            }
        }
    }

    async fn geocode_city(&self, city: &str, region_code: &str) -> Option<LatLng> {
        let normalized = crate::utils::normalize_query(city);
        let key = format!("geocode_city:{normalized}:{region_code}");
        let geocoder = self.geocoder.clone();
        let city_owned = city.to_string();
        let region = region_code.to_string();

        let result = self
            .cache
            .get_or_fetch(&key, self.canonical_ttl_s, || async move {
                let resolved = geocoder
                    .geocode(&city_owned, Some(&region))
                    .await
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
                Ok(match resolved {
                    Some(latlng) => json!({"lat": latlng.lat, "lng": latlng.lng}),
                    None => json!(null),
                })
            })
            .await;

        match result {
            Ok(value) => {
                let lat = value.get("lat")?.as_f64()?;
                let lng = value.get("lng")?.as_f64()?;
                Some(LatLng::new(lat, lng))
            }
            Err(e) => {
                tracing::warn!("city geocode failed for '{}': {}", city, e);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Nearby
    // ------------------------------------------------------------------

    async fn map_nearby(&self, inputs: &MappingInputs<'_>) -> Result<MappingOutput, SearchError> {
        let Some(center) = inputs.user_location else {
            return Err(SearchError::MapperFailed(
                "nearby route requires a user location".to_string(),
            ));
        };

        let request = NearbyMapRequest {
            query: inputs.query.to_string(),
            center,
            region_hint: inputs.intent.region.clone(),
        };
        let response: NearbyMapResponse = self
            .llm
            .call(&request, self.llm.timeouts().mapper_ms)
            .await
            .map_err(|e| SearchError::MapperFailed(e.to_string()))?;

        let radius_meters = clamp_radius(
            response.radius_meters,
            NEARBY_RADIUS_RANGE,
            NEARBY_RADIUS_DEFAULT,
        );
        let region_code = self.region_code(inputs, response.region.as_deref());
        // The deterministic extractor decides the cuisine; the model's
        // keyword is retained nowhere in the plan.
        let cuisine_key = canonical::extract_cuisine_key(inputs.query).map(str::to_string);

        let plan = NearbyPlan {
            center,
            radius_meters,
            cuisine_key,
            type_key: None,
            region_code,
            search_language: inputs.language_context.search_language,
        };

        Ok(MappingOutput { mapping: Mapping::Nearby(plan), city_center: None })
    }

    // ------------------------------------------------------------------
    // Landmark
    // ------------------------------------------------------------------

    async fn map_landmark(
        &self,
        inputs: &MappingInputs<'_>,
    ) -> Result<MappingOutput, SearchError> {
        let request = LandmarkMapRequest {
            query: inputs.query.to_string(),
            region_hint: inputs.intent.region.clone(),
        };
        let response: LandmarkMapResponse = self
            .llm
            .call(&request, self.llm.timeouts().mapper_ms)
            .await
            .map_err(|e| SearchError::MapperFailed(e.to_string()))?;

        let radius_meters = clamp_radius(
            response.radius_meters,
            LANDMARK_RADIUS_RANGE,
            LANDMARK_RADIUS_DEFAULT,
        );
        let cuisine_key = canonical::extract_cuisine_key(inputs.query).map(str::to_string);

        // Registry first, against the user's own words, then against the
        // model's geocode query. A hit pins id, coordinates and region, and
        // lets the provider stage skip geocoding entirely.
        let registry_entry = self
            .registry
            .resolve(inputs.query)
            .or_else(|| response.geocode_query.as_deref().and_then(|q| self.registry.resolve(q)));

        let (landmark_id, resolved_lat_lng, region_code) = match registry_entry {
            Some(entry) => (
                Some(entry.landmark_id.to_string()),
                Some(entry.lat_lng),
                entry.region_code.to_string(),
            ),
            None => {
                let geocode_query = response
                    .geocode_query
                    .clone()
                    .filter(|q| !q.trim().is_empty());
                let landmark_id = geocode_query.as_deref().map(LandmarkRegistry::fallback_id);
                (landmark_id, None, self.region_code(inputs, response.region.as_deref()))
            }
        };

        let plan = LandmarkPlan {
            landmark_id,
            geocode_query: response.geocode_query,
            resolved_lat_lng,
            radius_meters,
            cuisine_key,
            type_key: None,
            region_code,
            search_language: inputs.language_context.search_language,
        };

        Ok(MappingOutput { mapping: Mapping::Landmark(plan), city_center: None })
    }
}

fn clamp_radius(raw: Option<f64>, range: (f64, f64), default: f64) -> f64 {
    match raw {
        Some(r) if r.is_finite() && r > 0.0 => r.clamp(range.0, range.1),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planned_bias_radius_mirrors_the_bias_rule() {
        assert_eq!(planned_bias_radius(true, true), 10_000.0);
        assert_eq!(planned_bias_radius(true, false), 10_000.0);
        assert_eq!(planned_bias_radius(false, true), 20_000.0);
        assert_eq!(planned_bias_radius(false, false), 0.0);
    }

    #[test]
    fn radius_clamping() {
        assert_eq!(clamp_radius(Some(800.0), NEARBY_RADIUS_RANGE, NEARBY_RADIUS_DEFAULT), 800.0);
        assert_eq!(clamp_radius(Some(50.0), NEARBY_RADIUS_RANGE, NEARBY_RADIUS_DEFAULT), 300.0);
        assert_eq!(
            clamp_radius(Some(99_000.0), NEARBY_RADIUS_RANGE, NEARBY_RADIUS_DEFAULT),
            5_000.0
        );
        assert_eq!(clamp_radius(None, NEARBY_RADIUS_RANGE, NEARBY_RADIUS_DEFAULT), 1_500.0);
        assert_eq!(
            clamp_radius(Some(f64::NAN), LANDMARK_RADIUS_RANGE, LANDMARK_RADIUS_DEFAULT),
            500.0
        );
    }
}
