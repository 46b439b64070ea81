use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use savor::config::{Config, StoreBackend};
use savor::services::job_store::staleness::SubscriberProbe;
use savor::services::search::language::LanguagePolicy;
use savor::services::search::orchestrator::OrchestratorSettings;
use savor::services::{
    AssistantStage, GeocodeClient, JobStore, KvJobStore, LandmarkRegistry, MemoryJobStore,
    MemoryKv, PlacesClient, ProviderStage, RedisKv, RouteMapper, ScenarioRunner, SharedKv,
    StaleSweeper, TicketIssuer, TieredCache, WsHub,
};
use savor::utils::ScheduledExecutor;
use savor::{AppState, handlers, middleware};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::search::accept_search,
        handlers::search::get_result,
        handlers::ws::issue_ticket,
    ),
    components(schemas(
        savor::models::SearchRequest,
        savor::models::Pagination,
        savor::models::SearchAccepted,
        savor::models::PendingResponse,
        savor::models::PendingMeta,
        savor::models::SearchResponse,
        savor::models::FailedResponse,
        savor::models::RankedPlace,
        savor::models::ResponseMeta,
        savor::models::OrderExplain,
        savor::models::ScoreBreakdown,
        savor::models::LanguageContext,
        savor::models::Place,
        savor::models::LatLng,
        savor::models::SoftFilters,
        savor::models::OpenState,
        savor::models::PriceIntent,
        savor::models::RatingBucket,
        savor::models::ReviewCountBucket,
        savor::models::DietaryFlags,
        savor::models::TimeWindow,
        savor::models::OpeningHours,
        savor::models::OpenPeriod,
        savor::models::RankingProfile,
        savor::models::RankingWeights,
        savor::models::Language,
        savor::models::LanguageProvenance,
        savor::models::JobStatus,
        savor::models::ErrorCode,
        handlers::ws::TicketResponse,
    )),
    tags(
        (name = "Search", description = "Asynchronous restaurant search"),
        (name = "WebSocket", description = "Ticket-authenticated push channel"),
        (name = "System", description = "Health and diagnostics")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_tracing(&config);

    tracing::info!(
        "Starting savor on {}:{} (store backend: {:?})",
        config.server.host,
        config.server.port,
        config.store.backend
    );

    // Shared key-value store: L2 cache, WS tickets and (in redis mode) the
    // job records all live on it.
    let kv: Arc<dyn SharedKv> = match config.store.backend {
        StoreBackend::Redis => Arc::new(RedisKv::connect(&config.store.redis_url).await?),
        StoreBackend::Memory => Arc::new(MemoryKv::new()),
    };

    let store: Arc<dyn JobStore> = match config.store.backend {
        StoreBackend::Redis => Arc::new(KvJobStore::new(kv.clone(), config.store.job_ttl_s)),
        StoreBackend::Memory => Arc::new(MemoryJobStore::new()),
    };

    let cache = Arc::new(TieredCache::new(config.cache.clone(), kv.clone()));
    let hub = Arc::new(WsHub::new(config.ws.backlog_max));
    let tickets = Arc::new(TicketIssuer::new(kv.clone(), config.ws.ticket_ttl_s));

    let llm = Arc::new(ScenarioRunner::new(config.llm.clone()));
    let places = Arc::new(PlacesClient::new(config.places.clone()));
    let geocoder = Arc::new(GeocodeClient::new(config.places.clone()));
    let registry = Arc::new(LandmarkRegistry::with_known_landmarks());

    let mapper = Arc::new(RouteMapper::new(
        llm.clone(),
        geocoder.clone(),
        registry.clone(),
        cache.clone(),
        config.cache.canonical_query_ttl_s,
    ));
    let provider_stage = Arc::new(ProviderStage::new(
        places,
        geocoder,
        cache.clone(),
        config.cache.clone(),
    ));
    let assistant = Arc::new(AssistantStage::new(llm.clone()));

    let orchestrator = Arc::new(savor::SearchOrchestrator::new(
        store.clone(),
        hub.clone(),
        llm,
        mapper,
        provider_stage,
        assistant,
        registry,
        LanguagePolicy {
            policy: config.search.provider_language_policy,
            ..LanguagePolicy::default()
        },
        OrchestratorSettings {
            heartbeat_interval_ms: config.store.heartbeat_interval_ms,
            done_success_fresh_window_ms: config.store.done_success_fresh_window_ms,
            max_running_job_age_ms: config.store.max_running_job_age_ms,
            max_concurrent_jobs: config.search.max_concurrent_jobs,
        },
    ));

    // Stale sweeper: the only thing allowed to fail a job its worker
    // abandoned.
    let sweeper = StaleSweeper::new(
        store.clone(),
        hub.clone() as Arc<dyn SubscriberProbe>,
        config.store.max_running_job_age_ms,
    );
    let sweep_executor = ScheduledExecutor::new(
        "stale-job-sweeper",
        Duration::from_millis(config.store.stale_sweep_interval_ms),
    );
    let sweep_shutdown = sweep_executor.shutdown_handle();
    tokio::spawn(sweep_executor.start(Arc::new(sweeper)));

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        hub,
        tickets,
        orchestrator,
    });

    let app = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route("/api/search", post(handlers::search::accept_search))
        .route("/api/search/:request_id/result", get(handlers::search::get_result))
        .route("/api/ws-ticket", post(handlers::ws::issue_ticket))
        .route("/api/ws", get(handlers::ws::ws_upgrade))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn(middleware::session_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            sweep_shutdown.shutdown();
        })
        .await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    let stdout_layer = tracing_subscriber::fmt::layer();

    match &config.logging.file {
        Some(path) => {
            let directory = std::path::Path::new(path)
                .parent()
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "savor.log".to_string());
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(appender)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
        }
    }
}
