//! Provider stage
//!
//! Executes the route plan against the places API through the tiered cache,
//! so identical plans across requests (and languages, for landmarks) share
//! one outbound call. Every outbound call is preceded by a
//! `places_call_language` record asserting that the language reaching the
//! provider is the plan's own search language.

use serde_json::Value;
use std::sync::Arc;

use super::SearchError;
use crate::config::CacheConfig;
use crate::models::{
    Language, LandmarkPlan, LatLng, Mapping, NearbyPlan, Place, TextSearchPlan, included_types,
};
use crate::services::cache::TieredCache;
use crate::services::places::{
    CircleArea, Geocoder, LocationBias, NearbySearchBody, PlacesProvider, TextSearchBody,
};
use crate::utils::hash::short_hash;

pub struct ProviderStage {
    places: Arc<dyn PlacesProvider>,
    geocoder: Arc<dyn Geocoder>,
    cache: Arc<TieredCache>,
    config: CacheConfig,
}

impl ProviderStage {
    pub fn new(
        places: Arc<dyn PlacesProvider>,
        geocoder: Arc<dyn Geocoder>,
        cache: Arc<TieredCache>,
        config: CacheConfig,
    ) -> Self {
        Self { places, geocoder, cache, config }
    }

    /// Execute the plan. `search_language` is the resolved context language
    /// and must equal the language embedded in the plan; the mismatch case
    /// is a programming error upstream and fails the stage loudly.
    pub async fn execute(
        &self,
        mapping: &Mapping,
        search_language: Language,
    ) -> Result<Vec<Place>, SearchError> {
        let method = match mapping {
            Mapping::TextSearch(_) => "places.searchText",
            Mapping::Nearby(_) => "places.searchNearby",
            Mapping::Landmark(_) => "places.searchNearby(landmark)",
        };
        tracing::info!(
            "places_call_language provider_method={} search_language={} region_code={} mapping_language={}",
            method,
            search_language,
            mapping.region_code(),
            mapping.search_language(),
        );
        if mapping.search_language() != search_language {
            return Err(SearchError::StageFailed(format!(
                "mapping language {} does not match search language {}",
                mapping.search_language(),
                search_language
            )));
        }

        match mapping {
            Mapping::TextSearch(plan) => self.text_search(plan).await,
            Mapping::Nearby(plan) => self.nearby_search(plan).await,
            Mapping::Landmark(plan) => self.landmark_search(plan).await,
        }
    }

    // ------------------------------------------------------------------
    // Text search
    // ------------------------------------------------------------------

    async fn text_search(&self, plan: &TextSearchPlan) -> Result<Vec<Place>, SearchError> {
        let bias_key = plan
            .location_bias
            .as_ref()
            .map(|b| format!("{}:{}", b.center.bucket_key(), b.radius_meters as i64))
            .unwrap_or_else(|| "-".to_string());
        let cache_key = format!(
            "text_search:{}:{}:{}:{}",
            short_hash(&plan.text_query),
            bias_key,
            plan.region_code,
            plan.search_language,
        );

        let body = TextSearchBody {
            text_query: plan.text_query.clone(),
            language_code: plan.search_language.as_str().to_string(),
            region_code: plan.region_code.clone(),
            location_bias: plan.location_bias.as_ref().map(|b| LocationBias {
                circle: CircleArea { center: b.center.into(), radius: b.radius_meters },
            }),
        };

        let places = self.places.clone();
        self.fetch_places(&cache_key, move || async move {
            places
                .text_search(&body)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Nearby search
    // ------------------------------------------------------------------

    async fn nearby_search(&self, plan: &NearbyPlan) -> Result<Vec<Place>, SearchError> {
        let type_tag = plan
            .cuisine_key
            .as_deref()
            .or(plan.type_key.as_deref())
            .unwrap_or("restaurant");
        let cache_key = format!(
            "nearby_search:{}:{}:{}:{}:{}",
            plan.center.bucket_key(),
            plan.radius_meters as i64,
            type_tag,
            plan.region_code,
            plan.search_language,
        );

        let body = nearby_body(
            plan.center,
            plan.radius_meters,
            plan.cuisine_key.as_deref(),
            plan.type_key.as_deref(),
            plan.search_language,
            &plan.region_code,
        );

        let places = self.places.clone();
        self.fetch_places(&cache_key, move || async move {
            places
                .nearby_search(&body)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Landmark search
    // ------------------------------------------------------------------

    async fn landmark_search(&self, plan: &LandmarkPlan) -> Result<Vec<Place>, SearchError> {
        let landmark_id = plan
            .landmark_id
            .clone()
            .ok_or_else(|| SearchError::StageFailed("landmark plan without id".to_string()))?;

        // Tier one: landmark coordinates. Registry hits carry them in the
        // plan and skip this entirely; everything else geocodes once per
        // seven days.
        let center = match plan.resolved_lat_lng {
            Some(center) => center,
            None => self.resolve_landmark(&landmark_id, plan).await?,
        };

        // Tier two: the search itself, keyed canonically so every query
        // language shares the entry.
        let type_tag = plan
            .cuisine_key
            .as_deref()
            .or(plan.type_key.as_deref())
            .unwrap_or("restaurant");
        let cache_key = format!(
            "landmark_search:{}:{}:{}:{}",
            landmark_id, plan.radius_meters as i64, type_tag, plan.region_code,
        );

        let body = nearby_body(
            center,
            plan.radius_meters,
            plan.cuisine_key.as_deref(),
            plan.type_key.as_deref(),
            plan.search_language,
            &plan.region_code,
        );

        let places = self.places.clone();
        self.fetch_places(&cache_key, move || async move {
            places
                .nearby_search(&body)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))
        })
        .await
    }

    async fn resolve_landmark(
        &self,
        landmark_id: &str,
        plan: &LandmarkPlan,
    ) -> Result<LatLng, SearchError> {
        let geocode_query = plan
            .geocode_query
            .clone()
            .ok_or_else(|| {
                SearchError::StageFailed("landmark plan without geocode query".to_string())
            })?;
        let region = plan.region_code.clone();
        let geocoder = self.geocoder.clone();

        let cache_key = format!("landmark:{landmark_id}");
        let value = self
            .cache
            .get_or_fetch(&cache_key, self.config.landmark_resolution_ttl_s, || async move {
                let resolved = geocoder
                    .geocode(&geocode_query, Some(&region))
                    .await
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
                match resolved {
                    Some(latlng) => {
                        Ok(serde_json::json!({"lat": latlng.lat, "lng": latlng.lng}))
                    }
                    None => anyhow::bail!("landmark not found"),
                }
            })
            .await
            .map_err(|e| SearchError::ProviderFailed(format!("landmark resolution: {e}")))?;

        let lat = value
            .get("lat")
            .and_then(Value::as_f64)
            .ok_or_else(|| SearchError::ProviderFailed("corrupt landmark entry".to_string()))?;
        let lng = value
            .get("lng")
            .and_then(Value::as_f64)
            .ok_or_else(|| SearchError::ProviderFailed("corrupt landmark entry".to_string()))?;
        Ok(LatLng::new(lat, lng))
    }

    // ------------------------------------------------------------------

    async fn fetch_places<F, Fut>(
        &self,
        cache_key: &str,
        fetch: F,
    ) -> Result<Vec<Place>, SearchError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<Place>, anyhow::Error>>,
    {
        let value = self
            .cache
            .get_or_fetch(cache_key, self.config.l2_default_ttl_s, || async {
                let places = fetch().await?;
                Ok(serde_json::to_value(places)?)
            })
            .await
            .map_err(|e| SearchError::ProviderFailed(e.to_string()))?;

        serde_json::from_value(value)
            .map_err(|e| SearchError::ProviderFailed(format!("corrupt cached places: {e}")))
    }
}

fn nearby_body(
    center: LatLng,
    radius_meters: f64,
    cuisine_key: Option<&str>,
    type_key: Option<&str>,
    language: Language,
    region_code: &str,
) -> NearbySearchBody {
    NearbySearchBody {
        location_restriction: LocationBias {
            circle: CircleArea { center: center.into(), radius: radius_meters },
        },
        included_types: included_types(cuisine_key, type_key),
        language_code: language.as_str().to_string(),
        region_code: region_code.to_string(),
        rank_preference: "DISTANCE".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::MemoryKv;
    use crate::services::places::PlacesError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubProvider {
        calls: AtomicU32,
        places: Vec<Place>,
    }

    impl StubProvider {
        fn with_places(places: Vec<Place>) -> Self {
            Self { calls: AtomicU32::new(0), places }
        }
    }

    #[async_trait]
    impl PlacesProvider for StubProvider {
        async fn text_search(&self, _body: &TextSearchBody) -> Result<Vec<Place>, PlacesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.places.clone())
        }

        async fn nearby_search(
            &self,
            _body: &NearbySearchBody,
        ) -> Result<Vec<Place>, PlacesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.places.clone())
        }
    }

    struct StubGeocoder;

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn geocode(
            &self,
            _query: &str,
            _region: Option<&str>,
        ) -> Result<Option<LatLng>, PlacesError> {
            Ok(Some(LatLng::new(48.8584, 2.2945)))
        }
    }

    fn place(id: &str) -> Place {
        Place {
            place_id: id.to_string(),
            name: format!("Place {id}"),
            types: vec!["restaurant".to_string()],
            address: None,
            lat_lng: None,
            rating: None,
            user_ratings_total: None,
            price_level: None,
            opening_hours: None,
        }
    }

    fn stage(provider: Arc<StubProvider>) -> ProviderStage {
        let cache = Arc::new(TieredCache::new(
            CacheConfig::default(),
            Arc::new(MemoryKv::new()),
        ));
        ProviderStage::new(provider, Arc::new(StubGeocoder), cache, CacheConfig::default())
    }

    fn landmark_plan(language: Language) -> Mapping {
        Mapping::Landmark(LandmarkPlan {
            landmark_id: Some("eiffel-tower-paris".to_string()),
            geocode_query: None,
            resolved_lat_lng: Some(LatLng::new(48.8584, 2.2945)),
            radius_meters: 500.0,
            cuisine_key: Some("italian".to_string()),
            type_key: None,
            region_code: "FR".to_string(),
            search_language: language,
        })
    }

    #[tokio::test]
    async fn landmark_results_are_shared_across_languages() {
        let provider = Arc::new(StubProvider::with_places(vec![place("a"), place("b")]));
        let stage = stage(provider.clone());

        // Hebrew, English, French requests for the same landmark and
        // cuisine: one outbound call.
        for language in [Language::He, Language::En, Language::Fr] {
            let results = stage.execute(&landmark_plan(language), language).await.unwrap();
            assert_eq!(results.len(), 2);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn language_mismatch_fails_the_stage() {
        let provider = Arc::new(StubProvider::with_places(vec![]));
        let stage = stage(provider);
        let result = stage.execute(&landmark_plan(Language::He), Language::En).await;
        assert!(matches!(result, Err(SearchError::StageFailed(_))));
    }

    #[tokio::test]
    async fn provider_failure_is_typed() {
        struct FailingProvider;
        #[async_trait]
        impl PlacesProvider for FailingProvider {
            async fn text_search(
                &self,
                _body: &TextSearchBody,
            ) -> Result<Vec<Place>, PlacesError> {
                Err(PlacesError::Quota)
            }
            async fn nearby_search(
                &self,
                _body: &NearbySearchBody,
            ) -> Result<Vec<Place>, PlacesError> {
                Err(PlacesError::Quota)
            }
        }

        let cache = Arc::new(TieredCache::new(
            CacheConfig::default(),
            Arc::new(MemoryKv::new()),
        ));
        let stage = ProviderStage::new(
            Arc::new(FailingProvider),
            Arc::new(StubGeocoder),
            cache,
            CacheConfig::default(),
        );

        let plan = Mapping::TextSearch(TextSearchPlan {
            text_query: "pizza".to_string(),
            region_code: "IL".to_string(),
            search_language: Language::En,
            location_bias: None,
            required_terms: vec![],
            preferred_terms: vec![],
            strictness: crate::models::Strictness::RelaxIfEmpty,
            type_hint: None,
            cuisine_key: None,
        });
        let result = stage.execute(&plan, Language::En).await;
        assert!(matches!(result, Err(SearchError::ProviderFailed(_))));
    }

    #[tokio::test]
    async fn unresolved_landmark_geocodes_once_then_caches() {
        let provider = Arc::new(StubProvider::with_places(vec![place("x")]));
        let stage = stage(provider.clone());

        let plan = Mapping::Landmark(LandmarkPlan {
            landmark_id: Some("statue-of-liberty-new-york".to_string()),
            geocode_query: Some("Statue of Liberty".to_string()),
            resolved_lat_lng: None,
            radius_meters: 500.0,
            cuisine_key: None,
            type_key: None,
            region_code: "US".to_string(),
            search_language: Language::En,
        });

        let first = stage.execute(&plan, Language::En).await.unwrap();
        let second = stage.execute(&plan, Language::En).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
