//! HTTP surface behaviour
//!
//! Terminal jobs always answer with a complete 200 body, ownership
//! mismatches read as 404, and ticket issuance degrades with Retry-After
//! when the shared store is down.

use axum::{
    Router,
    body::Body,
    http::{Request as HttpRequest, StatusCode, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower::util::ServiceExt;

use super::common::*;
use crate::config::Config;
use crate::models::{ErrorCode, Job, JobStatus};
use crate::services::cache::{KvError, MemoryKv, SharedKv};
use crate::services::job_store::JobStore;
use crate::services::ws_hub::TicketIssuer;
use crate::{AppState, handlers, middleware};

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/search", post(handlers::search::accept_search))
        .route("/api/search/:request_id/result", get(handlers::search::get_result))
        .route("/api/ws-ticket", post(handlers::ws::issue_ticket))
        .layer(axum_middleware::from_fn(middleware::session_middleware))
        .with_state(state)
}

fn app_state(harness: &Harness, tickets: Arc<TicketIssuer>) -> Arc<AppState> {
    Arc::new(AppState {
        config: Config::default(),
        store: harness.store.clone(),
        hub: harness.hub.clone(),
        tickets,
        orchestrator: harness.orchestrator.clone(),
    })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn failed_job_with_lost_result_reads_as_result_missing() {
    let harness = Harness::new(StubPlaces::with_places(vec![]));
    let tickets = Arc::new(TicketIssuer::new(Arc::new(MemoryKv::new()), 60));
    let app = router(app_state(&harness, tickets));

    // A job that failed without managing to store its failure body.
    harness
        .store
        .create(Job::new("r-lost".into(), "s1".into(), "key-lost".into()))
        .await
        .unwrap();
    harness
        .store
        .set_status("r-lost", JobStatus::Running, Some(10))
        .await
        .unwrap();
    harness
        .store
        .set_error("r-lost", ErrorCode::SearchFailed, "stage blew up", None)
        .await
        .unwrap();

    let response = app
        .oneshot(
            HttpRequest::get("/api/search/r-lost/result")
                .header("x-session-id", "s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // HTTP 200 with the stable failure shape, not a transport error.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "DONE_FAILED");
    assert_eq!(body["code"], "RESULT_MISSING");
    assert_eq!(body["terminal"], true);
    assert_eq!(body["contractsVersion"], "search_contracts_v1");
}

#[tokio::test]
async fn ownership_mismatch_reads_as_not_found() {
    let harness = Harness::new(StubPlaces::with_places(vec![]));
    let tickets = Arc::new(TicketIssuer::new(Arc::new(MemoryKv::new()), 60));
    let app = router(app_state(&harness, tickets));

    harness
        .store
        .create(Job::new("r-owned".into(), "owner".into(), "key-owned".into()))
        .await
        .unwrap();

    let response = app
        .oneshot(
            HttpRequest::get("/api/search/r-owned/result")
                .header("x-session-id", "intruder")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn running_job_answers_202_with_progress_meta() {
    let harness = Harness::new(StubPlaces::with_places(vec![]));
    let tickets = Arc::new(TicketIssuer::new(Arc::new(MemoryKv::new()), 60));
    let app = router(app_state(&harness, tickets));

    harness
        .store
        .create(Job::new("r-run".into(), "s1".into(), "key-run".into()))
        .await
        .unwrap();
    harness
        .store
        .set_status("r-run", JobStatus::Running, Some(40))
        .await
        .unwrap();

    let response = app
        .oneshot(
            HttpRequest::get("/api/search/r-run/result")
                .header("x-session-id", "s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "RUNNING");
    assert_eq!(body["progress"], 40);
    assert_eq!(body["meta"]["isStale"], false);
}

#[tokio::test]
async fn ticket_issuance_requires_a_session() {
    let harness = Harness::new(StubPlaces::with_places(vec![]));
    let tickets = Arc::new(TicketIssuer::new(Arc::new(MemoryKv::new()), 60));
    let app = router(app_state(&harness, tickets));

    let denied = app
        .clone()
        .oneshot(
            HttpRequest::post("/api/ws-ticket")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let issued = app
        .oneshot(
            HttpRequest::post("/api/ws-ticket")
                .header("x-session-id", "s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(issued.status(), StatusCode::OK);
    let body = body_json(issued).await;
    assert!(body["ticket"].as_str().unwrap().len() > 10);
    assert_eq!(body["expiresInS"], 60);
}

#[tokio::test]
async fn ticket_store_outage_returns_503_with_retry_after() {
    struct DownKv;
    #[async_trait::async_trait]
    impl SharedKv for DownKv {
        async fn get(&self, _: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Connection("down".into()))
        }
        async fn set_ex(&self, _: &str, _: &str, _: u64) -> Result<(), KvError> {
            Err(KvError::Connection("down".into()))
        }
        async fn del(&self, _: &str) -> Result<(), KvError> {
            Err(KvError::Connection("down".into()))
        }
        async fn take(&self, _: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Connection("down".into()))
        }
        async fn set_nx_ex(&self, _: &str, _: &str, _: u64) -> Result<bool, KvError> {
            Err(KvError::Connection("down".into()))
        }
        async fn keys_with_prefix(&self, _: &str) -> Result<Vec<String>, KvError> {
            Err(KvError::Connection("down".into()))
        }
    }

    let harness = Harness::new(StubPlaces::with_places(vec![]));
    let tickets = Arc::new(TicketIssuer::new(Arc::new(DownKv), 60));
    let app = router(app_state(&harness, tickets));

    let response = app
        .oneshot(
            HttpRequest::post("/api/ws-ticket")
                .header("x-session-id", "s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    let body = body_json(response).await;
    assert_eq!(body["code"], "WS_TICKET_REDIS_UNAVAILABLE");
}

#[tokio::test]
async fn accept_rejects_non_async_mode_and_bad_bodies() {
    let harness = Harness::new(StubPlaces::with_places(vec![]));
    let tickets = Arc::new(TicketIssuer::new(Arc::new(MemoryKv::new()), 60));
    let app = router(app_state(&harness, tickets));

    let wrong_mode = app
        .clone()
        .oneshot(
            HttpRequest::post("/api/search?mode=sync")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"query": "pizza", "sessionId": "s1"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong_mode.status(), StatusCode::BAD_REQUEST);

    let empty_query = app
        .oneshot(
            HttpRequest::post("/api/search?mode=async")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"query": "", "sessionId": "s1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(empty_query.status(), StatusCode::BAD_REQUEST);
}
