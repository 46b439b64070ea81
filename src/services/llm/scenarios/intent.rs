//! Intent scenario
//!
//! Classifies the route (text search / nearby / landmark), the query
//! language with a confidence score, a region candidate, and an explicit
//! city if one was mentioned. The raw LLM record is validated into a typed
//! [`IntentResult`]; anything the model got wrong degrades field-by-field
//! instead of failing the stage.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{IntentReason, Language, Route};
use crate::services::llm::models::{LlmScenario, LlmScenarioRequest};

const SYSTEM_PROMPT: &str = r#"You classify restaurant-search queries. Respond with a single JSON object:
{
  "route": "TEXTSEARCH" | "NEARBY" | "LANDMARK",
  "reason": "nearby_intent" | "proximity_keywords" | "small_radius_detected" | "user_location_primary" | "explicit_city_mentioned" | "landmark_mentioned" | "default",
  "language": "<ISO-639-1 code of the query text>",
  "language_confidence": <0.0-1.0>,
  "region_candidate": "<ISO-3166-1 alpha-2 code or null>",
  "region_confidence": <0.0-1.0>,
  "city_text": "<explicit city name as written in the query, or null>"
}

Routing rules:
- "NEARBY" when the user wants places around their current position ("near me", "closest", walking distance).
- "LANDMARK" when the query anchors on a named landmark ("near the Eiffel Tower").
- "TEXTSEARCH" otherwise, including queries naming a city.
- "reason" must explain the route choice with one of the listed tags.
- "city_text" only for cities the user literally wrote; never infer one.
- Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct IntentRequest {
    pub query: String,
    pub has_user_location: bool,
    /// Region the request arrived from, as a weak prior only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_hint: Option<String>,
}

impl LlmScenarioRequest for IntentRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::Intent
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }
}

/// Raw wire record; every field individually optional-ish and revalidated.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentResponse {
    pub route: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub language_confidence: Option<f64>,
    #[serde(default)]
    pub region_candidate: Option<String>,
    #[serde(default)]
    pub region_confidence: Option<f64>,
    #[serde(default)]
    pub city_text: Option<String>,
}

/// Validated intent.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentResult {
    pub route: Route,
    pub reason: IntentReason,
    pub language: Language,
    pub language_confidence: f64,
    pub region: Option<String>,
    pub region_confidence: f64,
    pub city_text: Option<String>,
}

/// Region codes models habitually get wrong for real places.
static REGION_FIXUPS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // "IS" is Iceland; models emit it for Israel.
        ("IS", "IL"),
        // "UK" is not an ISO code.
        ("UK", "GB"),
    ])
});

/// ISO-3166-1 alpha-2 codes the service recognises. Codes outside the list
/// become `None` rather than log noise.
static KNOWN_REGIONS: &[&str] = &[
    "IL", "US", "GB", "FR", "DE", "ES", "IT", "RU", "UA", "AR", "MX", "BR", "CA", "AU", "NL",
    "BE", "CH", "AT", "PT", "GR", "TR", "AE", "SA", "EG", "MA", "JP", "KR", "CN", "IN", "TH",
    "SG", "PL", "CZ", "RO", "HU", "SE", "NO", "DK", "FI", "IE",
];

pub fn validate_region(candidate: Option<&str>) -> Option<String> {
    let raw = candidate?.trim().to_uppercase();
    if raw.is_empty() || raw == "NULL" {
        return None;
    }
    let fixed = REGION_FIXUPS.get(raw.as_str()).copied().unwrap_or(&raw);
    if KNOWN_REGIONS.contains(&fixed) {
        Some(fixed.to_string())
    } else {
        None
    }
}

fn parse_route(raw: &str) -> Route {
    match raw.trim().to_uppercase().as_str() {
        "NEARBY" => Route::Nearby,
        "LANDMARK" => Route::Landmark,
        _ => Route::TextSearch,
    }
}

fn parse_reason(raw: Option<&str>) -> IntentReason {
    match raw.map(|r| r.trim().to_lowercase()).as_deref() {
        Some("nearby_intent") => IntentReason::NearbyIntent,
        Some("proximity_keywords") => IntentReason::ProximityKeywords,
        Some("small_radius_detected") => IntentReason::SmallRadiusDetected,
        Some("user_location_primary") => IntentReason::UserLocationPrimary,
        Some("explicit_city_mentioned") => IntentReason::ExplicitCityMentioned,
        Some("landmark_mentioned") => IntentReason::LandmarkMentioned,
        _ => IntentReason::Default,
    }
}

/// Script-based language guess for the fallback path. Coarse on purpose:
/// it only has to be better than assuming English for every query.
pub fn guess_language_by_script(query: &str) -> Language {
    for ch in query.chars() {
        match ch {
            '\u{0590}'..='\u{05FF}' => return Language::He,
            '\u{0600}'..='\u{06FF}' => return Language::Ar,
            '\u{0400}'..='\u{04FF}' => return Language::Ru,
            _ => {}
        }
    }
    Language::En
}

impl IntentResult {
    pub fn from_response(response: IntentResponse, query: &str) -> Self {
        let language = response
            .language
            .as_deref()
            .and_then(Language::parse)
            .unwrap_or_else(|| guess_language_by_script(query));
        let language_confidence = response
            .language_confidence
            .filter(|c| (0.0..=1.0).contains(c))
            .unwrap_or(0.5);
        let region = validate_region(response.region_candidate.as_deref());
        let region_confidence = response
            .region_confidence
            .filter(|c| (0.0..=1.0).contains(c))
            .unwrap_or(0.0);
        let city_text = response
            .city_text
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && c.to_lowercase() != "null");

        Self {
            route: parse_route(&response.route),
            reason: parse_reason(response.reason.as_deref()),
            language,
            language_confidence,
            region,
            region_confidence,
            city_text,
        }
    }

    /// Used when the intent LLM failed after its retry. The language guess
    /// comes from the query's script; confidence is pinned low so assistant
    /// prose falls back to the UI preference.
    pub fn fallback(query: &str) -> Self {
        Self {
            route: Route::TextSearch,
            reason: IntentReason::Default,
            language: guess_language_by_script(query),
            language_confidence: 0.5,
            region: None,
            region_confidence: 0.0,
            city_text: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(route: &str) -> IntentResponse {
        IntentResponse {
            route: route.to_string(),
            reason: Some("explicit_city_mentioned".to_string()),
            language: Some("he".to_string()),
            language_confidence: Some(0.93),
            region_candidate: Some("IL".to_string()),
            region_confidence: Some(0.8),
            city_text: Some("תל אביב".to_string()),
        }
    }

    #[test]
    fn well_formed_response_round_trips() {
        let result = IntentResult::from_response(response("TEXTSEARCH"), "מסעדות בתל אביב");
        assert_eq!(result.route, Route::TextSearch);
        assert_eq!(result.reason, IntentReason::ExplicitCityMentioned);
        assert_eq!(result.language, Language::He);
        assert_eq!(result.region.as_deref(), Some("IL"));
        assert_eq!(result.city_text.as_deref(), Some("תל אביב"));
    }

    #[test]
    fn israel_fixup_applies() {
        assert_eq!(validate_region(Some("IS")).as_deref(), Some("IL"));
        assert_eq!(validate_region(Some("uk")).as_deref(), Some("GB"));
        assert_eq!(validate_region(Some("XX")), None);
        assert_eq!(validate_region(Some("null")), None);
        assert_eq!(validate_region(None), None);
    }

    #[test]
    fn unknown_route_defaults_to_text_search() {
        let result = IntentResult::from_response(response("TELEPORT"), "pizza");
        assert_eq!(result.route, Route::TextSearch);
    }

    #[test]
    fn out_of_range_confidence_resets() {
        let mut r = response("NEARBY");
        r.language_confidence = Some(7.0);
        let result = IntentResult::from_response(r, "pizza near me");
        assert_eq!(result.language_confidence, 0.5);
    }

    #[test]
    fn fallback_guesses_language_from_script() {
        assert_eq!(IntentResult::fallback("מסעדות").language, Language::He);
        assert_eq!(IntentResult::fallback("рестораны").language, Language::Ru);
        assert_eq!(IntentResult::fallback("مطاعم").language, Language::Ar);
        assert_eq!(IntentResult::fallback("restaurants").language, Language::En);
        let fallback = IntentResult::fallback("pizza");
        assert_eq!(fallback.language_confidence, 0.5);
        assert_eq!(fallback.reason, IntentReason::Default);
    }
}
