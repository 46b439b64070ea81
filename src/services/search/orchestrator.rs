//! Search orchestrator
//!
//! Owns the stage graph for one request: accept and dedup, gate, intent,
//! language resolution, the parallel filter stages with their skip rules,
//! candidate-pool reuse or the mapper/provider path, cuisine enforcement,
//! local filtering, ranking, response persistence, and the deferred
//! assistant. Progress milestones are published at 10, 25, 40, 60, 75, 90
//! and 100, and every stage boundary log carries the request id.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::assistant::AssistantStage;
use super::language::{self, LanguagePolicy};
use super::mapper::{MappingInputs, RouteMapper};
use super::post_filter;
use super::provider::ProviderStage;
use super::ranker;
use super::requery::{self, PoolStats};
use super::response;
use super::{LandmarkRegistry, SearchError};
use crate::models::{
    Anchor, AssistantContext, CandidatePool, DistanceOrigin, ErrorCode, Job, JobStatus, Language,
    LanguageContext, LatLng, Mapping, RankingProfile, Route, SearchAccepted, SearchContext,
    SearchRequest, SoftFilters, Strictness, WsServerMessage,
};
use crate::services::job_store::JobStore;
use crate::services::llm::scenarios::cuisine_enforcer::{
    CandidateForEnforcement, CuisineEnforcementRequest, CuisineEnforcementResponse,
    EnforcementOutcome,
};
use crate::services::llm::scenarios::filters::{
    BaseFiltersRequest, BaseFiltersResponse, PostConstraintsRequest, PostConstraintsResponse,
    has_filter_keywords,
};
use crate::services::llm::scenarios::gate::{FoodSignal, GateDecision, GateRequest, GateResponse};
use crate::services::llm::scenarios::intent::{IntentRequest, IntentResponse, IntentResult};
use crate::services::llm::ScenarioRunner;
use crate::services::ws_hub::WsHub;
use crate::utils::normalize_query;

pub struct OrchestratorSettings {
    pub heartbeat_interval_ms: u64,
    pub done_success_fresh_window_ms: i64,
    pub max_running_job_age_ms: i64,
    pub max_concurrent_jobs: usize,
}

pub struct SearchOrchestrator {
    store: Arc<dyn JobStore>,
    hub: Arc<WsHub>,
    llm: Arc<ScenarioRunner>,
    mapper: Arc<RouteMapper>,
    provider: Arc<ProviderStage>,
    assistant: Arc<AssistantStage>,
    registry: Arc<LandmarkRegistry>,
    policy: LanguagePolicy,
    settings: OrchestratorSettings,
    job_slots: Arc<Semaphore>,
}

/// Aborts the wrapped task when dropped. Keeps the heartbeat ticker from
/// outliving its worker on any exit path, panics included.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl SearchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        hub: Arc<WsHub>,
        llm: Arc<ScenarioRunner>,
        mapper: Arc<RouteMapper>,
        provider: Arc<ProviderStage>,
        assistant: Arc<AssistantStage>,
        registry: Arc<LandmarkRegistry>,
        policy: LanguagePolicy,
        settings: OrchestratorSettings,
    ) -> Self {
        let job_slots = Arc::new(Semaphore::new(settings.max_concurrent_jobs));
        Self {
            store,
            hub,
            llm,
            mapper,
            provider,
            assistant,
            registry,
            policy,
            settings,
            job_slots,
        }
    }

    // ------------------------------------------------------------------
    // Accept + dedup
    // ------------------------------------------------------------------

    /// Accept a search request: dedup against fresh jobs, or create a new
    /// one and start its worker.
    pub async fn accept(
        self: &Arc<Self>,
        request: SearchRequest,
    ) -> Result<SearchAccepted, SearchError> {
        let normalized = normalize_query(&request.query);
        let client_filters = request.filters.clone().unwrap_or_default();
        let key = crate::models::idempotency_key(
            &request.session_id,
            &normalized,
            "async",
            request.user_location,
            &client_filters.signature(),
        );

        if let Some(existing) = self.store.find_by_idempotency_key(&key).await? {
            if let Some(accepted) = self.reusable(&existing) {
                tracing::info!(
                    "dedup_hit request_id={} status={}",
                    existing.request_id,
                    existing.status.as_str()
                );
                return Ok(accepted);
            }
        }

        let request_id = Uuid::new_v4().simple().to_string();
        let job = Job::new(request_id.clone(), request.session_id.clone(), key);
        self.store.create(job).await?;

        let orchestrator = self.clone();
        let spawn_id = request_id.clone();
        tokio::spawn(async move {
            orchestrator.run_job(request, spawn_id).await;
        });

        Ok(SearchAccepted {
            result_url: format!("/api/search/{request_id}/result"),
            request_id,
            status: JobStatus::Queued,
        })
    }

    /// A prior job satisfies the request when it is still being worked on
    /// (fresh heartbeat or a live subscriber) or finished successfully
    /// moments ago.
    fn reusable(&self, job: &Job) -> Option<SearchAccepted> {
        let now = Utc::now();
        let reuse = match job.status {
            JobStatus::Queued => true,
            JobStatus::Running => {
                let fresh = job.updated_age_ms(now) <= self.settings.max_running_job_age_ms;
                let watched = self
                    .hub
                    .has_active_subscribers(&job.request_id, &job.session_id);
                if !fresh && watched {
                    tracing::info!(
                        "dedup_kept_alive_by_subscribers request_id={}",
                        job.request_id
                    );
                }
                fresh || watched
            }
            JobStatus::DoneSuccess => {
                job.updated_age_ms(now) <= self.settings.done_success_fresh_window_ms
            }
            JobStatus::DoneFailed => false,
        };

        reuse.then(|| SearchAccepted {
            request_id: job.request_id.clone(),
            result_url: format!("/api/search/{}/result", job.request_id),
            status: job.status,
        })
    }

    // ------------------------------------------------------------------
    // Worker
    // ------------------------------------------------------------------

    async fn run_job(self: Arc<Self>, request: SearchRequest, request_id: String) {
        let _permit = match self.job_slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let started = Instant::now();
        let session_id = request.session_id.clone();

        // Heartbeat ticker; stopped by the drop guard in every terminal
        // branch, including panics and cancellation.
        let heartbeat = {
            let store = self.store.clone();
            let request_id = request_id.clone();
            let interval = Duration::from_millis(self.settings.heartbeat_interval_ms);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = store.update_heartbeat(&request_id).await {
                        tracing::debug!("heartbeat stopped request_id={}: {}", request_id, e);
                        break;
                    }
                }
            })
        };
        let _heartbeat_guard = AbortOnDrop(heartbeat);

        match self.execute(&request, &request_id, started).await {
            Ok(()) => {}
            Err(e) => {
                let code = e.code();
                tracing::warn!("search_failed request_id={} code={}: {}", request_id, code, e);
                self.fail_job(&request_id, &session_id, code, &e.to_string()).await;
                self.spawn_assistant(
                    &request_id,
                    &session_id,
                    AssistantContext::SearchFailed,
                    request.ui_language.unwrap_or(Language::En),
                    &request.query,
                    None,
                    vec![],
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Stage graph
    // ------------------------------------------------------------------

    async fn execute(
        &self,
        request: &SearchRequest,
        request_id: &str,
        started: Instant,
    ) -> Result<(), SearchError> {
        let session_id = &request.session_id;
        let ui_language = request.ui_language.unwrap_or(Language::En);
        let normalized_query = normalize_query(&request.query);

        self.store
            .set_status(request_id, JobStatus::Running, Some(10))
            .await?;
        self.publish_progress(request_id, session_id, 10);

        // Gate. Fails open to MAYBE; NO is terminal.
        let gate = self.run_gate(request_id, &request.query).await;
        if gate.blocks_pipeline() {
            return self
                .finish_gate_fail(request, request_id, &gate)
                .await;
        }

        // Intent.
        let intent = self.run_intent(request_id, request).await;
        self.store
            .set_status(request_id, JobStatus::Running, Some(25))
            .await?;
        self.publish_progress(request_id, session_id, 25);

        // Language context.
        let language_context = language::resolve(
            ui_language,
            &request.query,
            intent.region.as_deref(),
            intent.language,
            intent.language_confidence,
            &self.policy,
        );
        language::validate(&language_context).map_err(SearchError::StageFailed)?;

        // Parallel stage: constraints + base filters, with the generic-query
        // skip rules, plus the provider preflight.
        let generic_query = gate.food_signal == FoodSignal::Yes
            && intent.city_text.is_none()
            && request.user_location.is_some();
        self.fire_preflight(&request.query, &intent, &language_context, request.user_location);

        let (post_constraints, extracted_filters) = self
            .run_filter_stages(request_id, &request.query, generic_query)
            .await;
        self.store
            .set_status(request_id, JobStatus::Running, Some(40))
            .await?;
        self.publish_progress(request_id, session_id, 40);

        // Merge: client-pinned filters override the extracted buckets;
        // dietary demands accumulate from every source.
        let filters = merge_filters(
            request.filters.clone().unwrap_or_default(),
            extracted_filters,
            &post_constraints.dietary,
        );

        // Candidate pool reuse or a fresh provider call.
        let prev_pool = self.store.latest_session_pool(session_id).await?;
        // Text-search radii follow the deterministic bias rule and can be
        // compared honestly before mapping. Nearby and landmark radii are
        // chosen by the mapper model, so a reuse check can only hold them
        // equal to the pool's own radius; those routes refetch via the
        // query/route/anchor triggers instead.
        let candidate_radius = match intent.route {
            Route::TextSearch => super::mapper::planned_bias_radius(
                intent.city_text.is_some(),
                request.user_location.is_some(),
            ),
            Route::Nearby | Route::Landmark => prev_pool
                .as_ref()
                .map(|p| p.context.radius_meters)
                .unwrap_or(0.0),
        };
        let next_context = SearchContext {
            query_text: normalized_query.clone(),
            route: intent.route,
            anchor: match (&intent.city_text, request.user_location) {
                (Some(city), _) => Anchor::City { text: city.clone(), center: None },
                (None, Some(location)) => Anchor::User { location },
                (None, None) => Anchor::None,
            },
            region_code: intent
                .region
                .clone()
                .unwrap_or_else(|| "IL".to_string()),
            radius_meters: candidate_radius,
            soft_filters: filters.clone(),
        };
        let pool_stats = prev_pool.as_ref().map(|pool| PoolStats {
            filtered_size: post_filter::apply(&pool.places, &filters, Utc::now()).len(),
        });
        let decision = requery::decide(prev_pool.as_ref().map(|p| &p.context), &next_context, pool_stats);

        let (places, mapping, city_center) = if !decision.do_provider_call {
            let pool = prev_pool.expect("reuse decision without pool");
            tracing::info!(
                "candidate_pool_reused request_id={} size={}",
                request_id,
                pool.places.len()
            );
            let city_center = match &pool.context.anchor {
                Anchor::City { center, .. } => *center,
                _ => None,
            };
            (pool.places, None, city_center)
        } else {
            let output = self
                .mapper
                .map(MappingInputs {
                    query: &request.query,
                    intent: &intent,
                    language_context: &language_context,
                    user_location: request.user_location,
                })
                .await?;
            let places = self
                .provider
                .execute(&output.mapping, language_context.search_language)
                .await?;

            let pool_context = SearchContext {
                anchor: match (&intent.city_text, request.user_location) {
                    (Some(city), _) => {
                        Anchor::City { text: city.clone(), center: output.city_center }
                    }
                    (None, Some(location)) => Anchor::User { location },
                    (None, None) => Anchor::None,
                },
                region_code: output.mapping.region_code().to_string(),
                radius_meters: mapping_radius(&output.mapping),
                ..next_context.clone()
            };
            let pool = CandidatePool {
                context: pool_context,
                places: places.clone(),
                fetched_at: Utc::now(),
            };
            if let Err(e) = self.store.set_candidate_pool(request_id, pool).await {
                tracing::warn!("candidate_pool_store_failed request_id={}: {}", request_id, e);
            }
            (places, Some(output.mapping), output.city_center)
        };
        self.store
            .set_status(request_id, JobStatus::Running, Some(60))
            .await?;
        self.publish_progress(request_id, session_id, 60);

        // Cuisine enforcement, only for freshly mapped text searches with
        // hard requirements.
        let (places, enforcement_failed) = match &mapping {
            Some(Mapping::TextSearch(plan)) if !plan.required_terms.is_empty() => {
                let outcome = self
                    .run_enforcer(request_id, &places, &plan.required_terms, &plan.preferred_terms, plan.strictness)
                    .await;
                let failed = outcome.enforcement_failed;
                (outcome.apply(places), failed)
            }
            _ => (places, false),
        };
        self.store
            .set_status(request_id, JobStatus::Running, Some(75))
            .await?;
        self.publish_progress(request_id, session_id, 75);

        // Local soft filters with the relaxation ladder.
        let (filtered, _effective_filters, relax_steps) =
            post_filter::apply_with_relaxation(&places, &filters, Utc::now());
        if !relax_steps.is_empty() {
            tracing::info!(
                "post_filter_relax_summary request_id={} steps={}",
                request_id,
                relax_steps.len()
            );
        }

        // Deterministic ranking.
        let profile = RankingProfile::select(
            intent.route,
            request.user_location.is_some(),
            intent.reason,
        );
        let origin =
            DistanceOrigin::resolve(intent.reason, city_center, request.user_location);
        let (ranked, order_explain) = ranker::rank(filtered, profile, origin);
        self.store
            .set_status(request_id, JobStatus::Running, Some(90))
            .await?;
        self.publish_progress(request_id, session_id, 90);

        // Persist the response and go terminal.
        let result_count = ranked.len();
        let top_names: Vec<String> = ranked
            .iter()
            .take(3)
            .map(|r| r.place.name.clone())
            .collect();
        let body = response::build_success(
            request_id,
            ranked,
            language_context.clone(),
            order_explain,
            started.elapsed().as_millis() as i64,
            enforcement_failed,
        );
        let value = serde_json::to_value(&body)
            .map_err(|e| SearchError::StageFailed(e.to_string()))?;
        if let Err(e) = self.store.set_result(request_id, value).await {
            // A lost result write is deliberately non-fatal; the read side
            // reports RESULT_MISSING.
            tracing::warn!("result_write_failed request_id={}: {}", request_id, e);
        }
        self.store
            .set_status(request_id, JobStatus::DoneSuccess, Some(100))
            .await?;
        self.hub.publish(
            request_id,
            session_id,
            WsServerMessage::StatusTerminal {
                request_id: request_id.to_string(),
                status: JobStatus::DoneSuccess,
                code: None,
            },
        );

        // Deferred assistant, delivered over the WS channel only.
        let context = if generic_query {
            AssistantContext::GenericQueryNarration
        } else if result_count == 0 && gate.food_signal == FoodSignal::Maybe {
            AssistantContext::Clarify
        } else {
            AssistantContext::Summary
        };
        self.spawn_assistant(
            request_id,
            session_id,
            context,
            language_context.assistant_language,
            &request.query,
            Some(result_count),
            top_names,
        );

        Ok(())
    }

    // ------------------------------------------------------------------
    // Individual stages
    // ------------------------------------------------------------------

    async fn run_gate(&self, request_id: &str, query: &str) -> GateDecision {
        let request = GateRequest { query: query.to_string() };
        match self
            .llm
            .call_with_retry::<_, GateResponse>(&request, self.llm.timeouts().gate_ms)
            .await
        {
            Ok(response) => {
                let decision = GateDecision::from_response(response);
                tracing::info!(
                    "gate_decided request_id={} signal={:?} reason={}",
                    request_id,
                    decision.food_signal,
                    decision.reason
                );
                decision
            }
            Err(e) => {
                tracing::warn!("gate_failed_open request_id={}: {}", request_id, e);
                GateDecision::failed_open()
            }
        }
    }

    async fn run_intent(&self, request_id: &str, request: &SearchRequest) -> IntentResult {
        let intent_request = IntentRequest {
            query: request.query.clone(),
            has_user_location: request.user_location.is_some(),
            region_hint: None,
        };
        match self
            .llm
            .call_with_retry::<_, IntentResponse>(&intent_request, self.llm.timeouts().intent_ms)
            .await
        {
            Ok(response) => {
                let result = IntentResult::from_response(response, &request.query);
                tracing::info!(
                    "intent_classified request_id={} route={} reason={:?} language={}",
                    request_id,
                    result.route.as_str(),
                    result.reason,
                    result.language
                );
                result
            }
            Err(e) => {
                tracing::warn!("intent_fallback request_id={}: {}", request_id, e);
                IntentResult::fallback(&request.query)
            }
        }
    }

    /// The two filter LLM calls run as siblings and are joined here; the
    /// deterministic skip rules decide which of them run at all.
    async fn run_filter_stages(
        &self,
        request_id: &str,
        query: &str,
        generic_query: bool,
    ) -> (PostConstraintsResponse, SoftFilters) {
        let run_post_constraints = !generic_query;
        let run_base_filters = !generic_query || has_filter_keywords(query);

        if !run_post_constraints {
            tracing::info!("post_constraints_skipped request_id={}", request_id);
        }
        if !run_base_filters {
            tracing::info!("base_filters_skipped request_id={}", request_id);
        }

        let post_constraints_fut = async {
            if !run_post_constraints {
                return PostConstraintsResponse::default();
            }
            let request = PostConstraintsRequest { query: query.to_string() };
            match self
                .llm
                .call::<_, PostConstraintsResponse>(&request, self.llm.timeouts().filters_ms)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        "post_constraints_fallback request_id={}: {}",
                        request_id,
                        e
                    );
                    PostConstraintsResponse::default()
                }
            }
        };

        let base_filters_fut = async {
            if !run_base_filters {
                return SoftFilters::default();
            }
            let request = BaseFiltersRequest { query: query.to_string() };
            match self
                .llm
                .call::<_, BaseFiltersResponse>(&request, self.llm.timeouts().filters_ms)
                .await
            {
                Ok(response) => response.into_soft_filters(),
                Err(e) => {
                    tracing::warn!("base_filters_fallback request_id={}: {}", request_id, e);
                    SoftFilters::default()
                }
            }
        };

        tokio::join!(post_constraints_fut, base_filters_fut)
    }

    /// Early provider preflight: everything derivable without the filter
    /// LLMs is warmed while they run. Failures are invisible.
    fn fire_preflight(
        &self,
        query: &str,
        intent: &IntentResult,
        language_context: &LanguageContext,
        user_location: Option<LatLng>,
    ) {
        // City geocode for explicit-city text searches.
        if let Some(city) = intent.city_text.clone() {
            let mapper = self.mapper.clone();
            let region = intent.region.clone().unwrap_or_else(|| "IL".to_string());
            tokio::spawn(async move {
                mapper.warm_city_geocode(&city, &region).await;
            });
            return;
        }

        // Default-radius nearby call with the deterministically derivable
        // cuisine; the single-flight cache folds it into the real call when
        // the mapper lands on the same plan.
        if intent.route == Route::Nearby {
            if let Some(center) = user_location {
                let plan = crate::models::NearbyPlan {
                    center,
                    radius_meters: 1_500.0,
                    cuisine_key: super::canonical::extract_cuisine_key(query)
                        .map(str::to_string),
                    type_key: None,
                    region_code: intent.region.clone().unwrap_or_else(|| "IL".to_string()),
                    search_language: language_context.search_language,
                };
                let provider = self.provider.clone();
                let search_language = language_context.search_language;
                tokio::spawn(async move {
                    let _ = provider
                        .execute(&Mapping::Nearby(plan), search_language)
                        .await;
                });
            }
        }
    }

    async fn run_enforcer(
        &self,
        request_id: &str,
        places: &[crate::models::Place],
        required_terms: &[String],
        preferred_terms: &[String],
        strictness: Strictness,
    ) -> EnforcementOutcome {
        let request = CuisineEnforcementRequest {
            required_terms: required_terms.to_vec(),
            preferred_terms: preferred_terms.to_vec(),
            candidates: places.iter().map(CandidateForEnforcement::from).collect(),
        };
        match self
            .llm
            .call::<_, CuisineEnforcementResponse>(&request, self.llm.timeouts().enforcer_ms)
            .await
        {
            Ok(response) => {
                let outcome = EnforcementOutcome::from_response(response, strictness);
                tracing::info!(
                    "cuisine_enforced request_id={} kept={} relax_applied={}",
                    request_id,
                    outcome.keep.len(),
                    outcome.relax_applied
                );
                outcome
            }
            Err(e) => {
                tracing::warn!("cuisine_enforcement_failed request_id={}: {}", request_id, e);
                EnforcementOutcome::pass_through(places)
            }
        }
    }

    /// Persist the stable failure body, record the error, and publish the
    /// terminal event. The body goes into the result slot first (while the
    /// job is still RUNNING), so clients read the specific code; a lost
    /// write degrades to RESULT_MISSING on the read side.
    async fn fail_job(&self, request_id: &str, session_id: &str, code: ErrorCode, message: &str) {
        let body = response::build_failure(request_id, code, message);
        match serde_json::to_value(&body) {
            Ok(value) => {
                if let Err(e) = self.store.set_result(request_id, value).await {
                    tracing::warn!("failure_write_skipped request_id={}: {}", request_id, e);
                }
            }
            Err(e) => tracing::warn!("failure_serialize_failed request_id={}: {}", request_id, e),
        }
        if let Err(e) = self.store.set_error(request_id, code, message, None).await {
            tracing::warn!("error_write_skipped request_id={}: {}", request_id, e);
        }
        self.hub.publish(
            request_id,
            session_id,
            WsServerMessage::StatusTerminal {
                request_id: request_id.to_string(),
                status: JobStatus::DoneFailed,
                code: Some(code),
            },
        );
    }

    async fn finish_gate_fail(
        &self,
        request: &SearchRequest,
        request_id: &str,
        gate: &GateDecision,
    ) -> Result<(), SearchError> {
        let session_id = &request.session_id;
        tracing::info!("gate_rejected request_id={} reason={}", request_id, gate.reason);

        self.fail_job(
            request_id,
            session_id,
            ErrorCode::GateFail,
            "query is not a food search",
        )
        .await;

        // The detected query language is unknown this early; prose follows
        // the UI preference.
        self.spawn_assistant(
            request_id,
            session_id,
            AssistantContext::GateFail,
            request.ui_language.unwrap_or(Language::En),
            &request.query,
            None,
            vec![],
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_assistant(
        &self,
        request_id: &str,
        session_id: &str,
        context: AssistantContext,
        language: Language,
        query: &str,
        result_count: Option<usize>,
        top_names: Vec<String>,
    ) {
        let assistant = self.assistant.clone();
        let hub = self.hub.clone();
        let request_id = request_id.to_string();
        let session_id = session_id.to_string();
        let query = query.to_string();

        tokio::spawn(async move {
            let payload = assistant
                .generate(context, language, &query, result_count, top_names)
                .await;
            hub.publish(
                &request_id,
                &session_id,
                WsServerMessage::Assistant { request_id: request_id.clone(), payload },
            );
        });
    }

    fn publish_progress(&self, request_id: &str, session_id: &str, progress: u8) {
        self.hub.publish(
            request_id,
            session_id,
            WsServerMessage::StatusRunning { request_id: request_id.to_string(), progress },
        );
    }

    /// Landmark registry accessor for handlers and diagnostics.
    pub fn landmark_registry(&self) -> &LandmarkRegistry {
        &self.registry
    }
}

fn mapping_radius(mapping: &Mapping) -> f64 {
    match mapping {
        Mapping::TextSearch(plan) => plan
            .location_bias
            .as_ref()
            .map(|b| b.radius_meters)
            .unwrap_or(0.0),
        Mapping::Nearby(plan) => plan.radius_meters,
        Mapping::Landmark(plan) => plan.radius_meters,
    }
}

/// Client-pinned filters override extracted buckets field-wise; dietary
/// requirements accumulate across sources.
fn merge_filters(
    client: SoftFilters,
    extracted: SoftFilters,
    constraint_dietary: &crate::models::DietaryFlags,
) -> SoftFilters {
    let dietary = crate::models::DietaryFlags {
        kosher: client.dietary.kosher || extracted.dietary.kosher || constraint_dietary.kosher,
        halal: client.dietary.halal || extracted.dietary.halal || constraint_dietary.halal,
        vegan: client.dietary.vegan || extracted.dietary.vegan || constraint_dietary.vegan,
        vegetarian: client.dietary.vegetarian
            || extracted.dietary.vegetarian
            || constraint_dietary.vegetarian,
        gluten_free: client.dietary.gluten_free
            || extracted.dietary.gluten_free
            || constraint_dietary.gluten_free,
    };

    SoftFilters {
        open_state: client.open_state.or(extracted.open_state),
        open_at: client.open_at.or(extracted.open_at),
        open_between: client.open_between.or(extracted.open_between),
        price_intent: client.price_intent.or(extracted.price_intent),
        min_rating: client.min_rating.or(extracted.min_rating),
        min_review_count: client.min_review_count.or(extracted.min_review_count),
        dietary,
    }
}
