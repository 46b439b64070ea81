//! Idempotent request deduplication

use super::common::*;
use crate::services::llm::LlmScenario;

#[tokio::test]
async fn identical_requests_share_one_job() {
    let harness = Harness::new(StubPlaces::with_places(sample_places(5)));
    harness.llm.set_default(LlmScenario::Gate, &gate_yes());
    harness
        .llm
        .set_default(LlmScenario::PostConstraints, &post_constraints_empty());
    harness
        .llm
        .set_default(LlmScenario::BaseFilters, &base_filters_empty());
    harness
        .llm
        .set_default(LlmScenario::RouteMapper, &text_mapper_reply("פיצה"));
    harness.llm.set_default(
        LlmScenario::Intent,
        &intent_reply("TEXTSEARCH", "default", "he", 0.9, Some("IL"), None),
    );

    let first = harness
        .orchestrator
        .accept(request("פיצה", "session-dd"))
        .await
        .unwrap();
    let second = harness
        .orchestrator
        .accept(request("פיצה", "session-dd"))
        .await
        .unwrap();

    // Same idempotency key within the freshness window: one job.
    assert_eq!(first.request_id, second.request_id);

    // A different session is a different identity.
    let other = harness
        .orchestrator
        .accept(request("פיצה", "session-other"))
        .await
        .unwrap();
    assert_ne!(first.request_id, other.request_id);

    harness.await_terminal(&first.request_id, "session-dd").await;
    harness.await_terminal(&other.request_id, "session-other").await;
}

#[tokio::test]
async fn progress_is_monotone_over_the_job_lifetime() {
    let harness = Harness::new(StubPlaces::with_places(sample_places(5)));
    harness.llm.set_default(LlmScenario::Gate, &gate_yes());
    harness
        .llm
        .set_default(LlmScenario::PostConstraints, &post_constraints_empty());
    harness
        .llm
        .set_default(LlmScenario::BaseFilters, &base_filters_empty());
    harness
        .llm
        .set_default(LlmScenario::RouteMapper, &text_mapper_reply("פיצה"));
    harness.llm.set_default(
        LlmScenario::Intent,
        &intent_reply("TEXTSEARCH", "default", "he", 0.9, Some("IL"), None),
    );

    let accepted = harness
        .orchestrator
        .accept(request("פיצה משובחת", "session-prog"))
        .await
        .unwrap();

    // Observe progress while the job runs; it must never decrease.
    let mut last = 0u8;
    loop {
        let Some(job) = harness
            .store
            .get(&accepted.request_id, "session-prog")
            .await
            .unwrap()
        else {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            continue;
        };
        assert!(job.progress >= last, "progress went backwards: {} -> {}", last, job.progress);
        last = job.progress;
        if job.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(last, 100);
}
