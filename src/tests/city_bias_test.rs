//! An explicitly mentioned city outranks the user's own location
//!
//! A Gedera query from a device sitting in Tel Aviv biases the provider
//! call to Gedera's center with the 10 km city radius, and ranking
//! distances are measured from Gedera.

use super::common::*;
use crate::models::JobStatus;
use crate::services::llm::LlmScenario;

#[tokio::test]
async fn explicit_city_beats_user_location_for_bias_and_distance() {
    let harness = Harness::new(StubPlaces::with_places(sample_places(6)));
    harness.llm.set_default(LlmScenario::Gate, &gate_yes());
    harness
        .llm
        .set_default(LlmScenario::PostConstraints, &post_constraints_empty());
    harness
        .llm
        .set_default(LlmScenario::BaseFilters, &base_filters_empty());
    harness
        .llm
        .set_default(LlmScenario::RouteMapper, &text_mapper_reply("איטלקי בגדרה"));
    harness.llm.push(
        LlmScenario::Intent,
        Ok(intent_reply(
            "TEXTSEARCH",
            "explicit_city_mentioned",
            "he",
            0.92,
            Some("IL"),
            Some("גדרה"),
        )),
    );

    let mut req = request("מסעדות איטלקיות בגדרה", "session-1");
    req.user_location = Some(TEL_AVIV);
    let job = harness.run_to_completion(req).await;
    assert_eq!(job.status, JobStatus::DoneSuccess);

    // Provider bias: circle around the Gedera geocode, 10 km radius.
    let body = harness
        .places
        .last_text_body
        .lock()
        .unwrap()
        .clone()
        .expect("text search body");
    let bias = body.location_bias.expect("location bias");
    assert!((bias.circle.center.latitude - GEDERA_CENTER.lat).abs() < 1e-6);
    assert!((bias.circle.center.longitude - GEDERA_CENTER.lng).abs() < 1e-6);
    assert_eq!(bias.circle.radius, 10_000.0);

    // Distance origin is the city center, not the device.
    let explain = &job.result.as_ref().unwrap()["meta"]["orderExplain"];
    assert_eq!(explain["distanceOrigin"], "CITY_CENTER");
    assert!((explain["distanceRef"]["lat"].as_f64().unwrap() - GEDERA_CENTER.lat).abs() < 1e-6);

    // Spot-check: breakdown distances match Gedera, not Tel Aviv.
    let breakdown = explain["topBreakdown"].as_array().unwrap();
    let first = &breakdown[0];
    let place_id = first["placeId"].as_str().unwrap();
    let place = sample_places(6)
        .into_iter()
        .find(|p| p.place_id == place_id)
        .unwrap();
    let expected = GEDERA_CENTER.distance_meters(&place.lat_lng.unwrap());
    let reported = first["distanceMeters"].as_f64().unwrap();
    assert!((expected - reported).abs() < 1.0);
}
