//! Shared test harness
//!
//! A full pipeline wired against in-process fakes: a scripted chat backend
//! standing in for the LLM, a stub places provider that records its calls,
//! and a fixed-answer geocoder. Everything runs on the memory store and an
//! in-memory shared KV, so tests exercise the real orchestrator code path
//! end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{CacheConfig, LlmTimeouts};
use crate::models::{LatLng, Place, SearchRequest};
use crate::services::cache::{MemoryKv, TieredCache};
use crate::services::job_store::MemoryJobStore;

// Re-exported so `use super::common::*` pulls the store trait into scope.
pub use crate::services::job_store::JobStore;
use crate::services::llm::{ChatBackend, LlmError, LlmScenario, ScenarioRunner};
use crate::services::places::{
    Geocoder, NearbySearchBody, PlacesError, PlacesProvider, TextSearchBody,
};
use crate::services::search::language::LanguagePolicy;
use crate::services::search::orchestrator::OrchestratorSettings;
use crate::services::search::{
    AssistantStage, LandmarkRegistry, ProviderStage, RouteMapper, SearchOrchestrator,
};
use crate::services::ws_hub::WsHub;

// ============================================================================
// Scripted LLM backend
// ============================================================================

type ScriptedReply = Result<String, LlmError>;

/// Chat backend answering from per-scenario scripts. Each scenario pops its
/// queued replies first and then falls back to the configured default;
/// scenarios with neither fail like an unreachable model.
#[derive(Default)]
pub struct ScriptedLlm {
    queues: Mutex<HashMap<LlmScenario, Vec<ScriptedReply>>>,
    defaults: Mutex<HashMap<LlmScenario, String>>,
    calls: Mutex<HashMap<LlmScenario, u32>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&self, scenario: LlmScenario, json: &str) {
        self.defaults
            .lock()
            .unwrap()
            .insert(scenario, json.to_string());
    }

    pub fn push(&self, scenario: LlmScenario, reply: ScriptedReply) {
        self.queues
            .lock()
            .unwrap()
            .entry(scenario)
            .or_default()
            .push(reply);
    }

    pub fn calls(&self, scenario: LlmScenario) -> u32 {
        self.calls.lock().unwrap().get(&scenario).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChatBackend for ScriptedLlm {
    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        scenario: LlmScenario,
        _system_prompt: &str,
        _user_prompt: &str,
        _timeout_ms: u64,
    ) -> Result<(String, i32, i32), LlmError> {
        *self.calls.lock().unwrap().entry(scenario).or_insert(0) += 1;

        let queued = {
            let mut queues = self.queues.lock().unwrap();
            queues.get_mut(&scenario).and_then(|q| {
                if q.is_empty() { None } else { Some(q.remove(0)) }
            })
        };
        if let Some(reply) = queued {
            return reply.map(|content| (content, 10, 5));
        }

        let default = self.defaults.lock().unwrap().get(&scenario).cloned();
        match default {
            Some(content) => Ok((content, 10, 5)),
            None => Err(LlmError::ApiError(format!(
                "no script for scenario {}",
                scenario.as_str()
            ))),
        }
    }
}

// ============================================================================
// Stub provider + geocoder
// ============================================================================

pub struct StubPlaces {
    pub places: Mutex<Vec<Place>>,
    pub text_calls: AtomicU32,
    pub nearby_calls: AtomicU32,
    pub last_text_body: Mutex<Option<TextSearchBody>>,
    pub last_nearby_body: Mutex<Option<NearbySearchBody>>,
}

impl StubPlaces {
    pub fn with_places(places: Vec<Place>) -> Arc<Self> {
        Arc::new(Self {
            places: Mutex::new(places),
            text_calls: AtomicU32::new(0),
            nearby_calls: AtomicU32::new(0),
            last_text_body: Mutex::new(None),
            last_nearby_body: Mutex::new(None),
        })
    }

    pub fn total_calls(&self) -> u32 {
        self.text_calls.load(Ordering::SeqCst) + self.nearby_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlacesProvider for StubPlaces {
    async fn text_search(&self, body: &TextSearchBody) -> Result<Vec<Place>, PlacesError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_text_body.lock().unwrap() = Some(body.clone());
        Ok(self.places.lock().unwrap().clone())
    }

    async fn nearby_search(&self, body: &NearbySearchBody) -> Result<Vec<Place>, PlacesError> {
        self.nearby_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_nearby_body.lock().unwrap() = Some(body.clone());
        Ok(self.places.lock().unwrap().clone())
    }
}

pub const GEDERA_CENTER: LatLng = LatLng { lat: 31.8090, lng: 34.7748 };
pub const TEL_AVIV: LatLng = LatLng { lat: 32.0853, lng: 34.7818 };

pub struct StubGeocoder {
    pub calls: AtomicU32,
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(
        &self,
        query: &str,
        _region: Option<&str>,
    ) -> Result<Option<LatLng>, PlacesError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let normalized = query.to_lowercase();
        if normalized.contains("גדרה") || normalized.contains("gedera") {
            Ok(Some(GEDERA_CENTER))
        } else if normalized.contains("תל אביב") || normalized.contains("tel aviv") {
            Ok(Some(TEL_AVIV))
        } else {
            Ok(Some(LatLng::new(0.0, 0.0)))
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub orchestrator: Arc<SearchOrchestrator>,
    pub store: Arc<MemoryJobStore>,
    pub hub: Arc<WsHub>,
    pub llm: Arc<ScriptedLlm>,
    pub places: Arc<StubPlaces>,
    pub geocoder: Arc<StubGeocoder>,
}

impl Harness {
    pub fn new(places: Arc<StubPlaces>) -> Self {
        let llm = Arc::new(ScriptedLlm::new());
        llm.set_default(
            LlmScenario::Assistant,
            r#"{"message": "Done.", "question": null}"#,
        );

        let store = Arc::new(MemoryJobStore::new());
        let hub = Arc::new(WsHub::new(32));
        let kv = Arc::new(MemoryKv::new());
        let cache = Arc::new(TieredCache::new(CacheConfig::default(), kv));
        let geocoder = Arc::new(StubGeocoder { calls: AtomicU32::new(0) });
        let registry = Arc::new(LandmarkRegistry::with_known_landmarks());
        let runner = Arc::new(ScenarioRunner::with_backend(
            llm.clone(),
            LlmTimeouts::default(),
        ));

        let mapper = Arc::new(RouteMapper::new(
            runner.clone(),
            geocoder.clone(),
            registry.clone(),
            cache.clone(),
            86_400,
        ));
        let provider_stage = Arc::new(ProviderStage::new(
            places.clone(),
            geocoder.clone(),
            cache,
            CacheConfig::default(),
        ));
        let assistant = Arc::new(AssistantStage::new(runner.clone()));

        let orchestrator = Arc::new(SearchOrchestrator::new(
            store.clone(),
            hub.clone(),
            runner,
            mapper,
            provider_stage,
            assistant,
            registry,
            LanguagePolicy::default(),
            OrchestratorSettings {
                heartbeat_interval_ms: 15_000,
                done_success_fresh_window_ms: 5_000,
                max_running_job_age_ms: 90_000,
                max_concurrent_jobs: 8,
            },
        ));

        Self { orchestrator, store, hub, llm, places, geocoder }
    }

    /// Submit a request and wait for its job to reach a terminal state.
    pub async fn run_to_completion(&self, request: SearchRequest) -> crate::models::Job {
        let session_id = request.session_id.clone();
        let accepted = self.orchestrator.accept(request).await.expect("accept");
        self.await_terminal(&accepted.request_id, &session_id).await
    }

    pub async fn await_terminal(&self, request_id: &str, session_id: &str) -> crate::models::Job {
        for _ in 0..200 {
            if let Some(job) = self.store.get(request_id, session_id).await.unwrap() {
                if job.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {request_id} did not finish");
    }
}

// ============================================================================
// Fixture builders
// ============================================================================

pub fn request(query: &str, session_id: &str) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        ui_language: None,
        user_location: None,
        session_id: session_id.to_string(),
        pagination: None,
        filters: None,
    }
}

pub fn place(id: &str, name: &str, rating: f64, reviews: u32, at: LatLng) -> Place {
    Place {
        place_id: id.to_string(),
        name: name.to_string(),
        types: vec!["restaurant".to_string()],
        address: None,
        lat_lng: Some(at),
        rating: Some(rating),
        user_ratings_total: Some(reviews),
        price_level: None,
        opening_hours: None,
    }
}

pub fn sample_places(count: usize) -> Vec<Place> {
    (0..count)
        .map(|i| {
            place(
                &format!("p{i:02}"),
                &format!("Restaurant {i}"),
                3.5 + (i % 3) as f64 * 0.5,
                50 + (i as u32) * 40,
                LatLng::new(32.05 + i as f64 * 0.004, 34.75 + i as f64 * 0.004),
            )
        })
        .collect()
}

// Scripted LLM replies.

pub fn gate_yes() -> String {
    r#"{"is_food_search": true, "reason": "food query", "food_signal": "YES"}"#.to_string()
}

pub fn gate_no() -> String {
    r#"{"is_food_search": false, "reason": "not about food", "food_signal": "NO"}"#.to_string()
}

pub fn intent_reply(
    route: &str,
    reason: &str,
    language: &str,
    confidence: f64,
    region: Option<&str>,
    city: Option<&str>,
) -> String {
    serde_json::json!({
        "route": route,
        "reason": reason,
        "language": language,
        "language_confidence": confidence,
        "region_candidate": region,
        "region_confidence": 0.8,
        "city_text": city,
    })
    .to_string()
}

pub fn text_mapper_reply(text_query: &str) -> String {
    serde_json::json!({
        "text_query": text_query,
        "region": "IL",
        "language": "he",
        "required_terms": [],
        "preferred_terms": [],
        "strictness": "RELAX_IF_EMPTY",
        "type_hint": "restaurant",
    })
    .to_string()
}

pub fn nearby_mapper_reply(radius: f64) -> String {
    serde_json::json!({
        "radius_meters": radius,
        "keyword": null,
        "region": "IL",
        "language": "he",
    })
    .to_string()
}

pub fn landmark_mapper_reply(geocode_query: &str, radius: f64, region: &str) -> String {
    serde_json::json!({
        "geocode_query": geocode_query,
        "radius_meters": radius,
        "keyword": null,
        "region": region,
        "language": "en",
    })
    .to_string()
}

pub fn base_filters_empty() -> String {
    r#"{"open_state": null, "open_at": null, "open_between": null, "price_intent": null, "min_rating_bucket": null, "min_review_count_bucket": null, "dietary": {}}"#.to_string()
}

pub fn post_constraints_empty() -> String {
    r#"{"dietary": {}, "accessibility": [], "must_have_keywords": []}"#.to_string()
}
