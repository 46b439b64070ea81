//! Route-mapper scenarios
//!
//! One scenario per route. The LLM drafts the provider call (query text,
//! radius, terms); everything that must be deterministic — canonical query,
//! cuisine key, bias selection, landmark resolution, search language — is
//! applied afterwards by the mapping stage, never taken from the model.

use serde::{Deserialize, Serialize};

use crate::models::LatLng;
use crate::services::llm::models::{LlmScenario, LlmScenarioRequest};

// ============================================================================
// Text-search mapper
// ============================================================================

const TEXT_SEARCH_PROMPT: &str = r#"Plan a text search against a places API for a restaurant query. Respond with a single JSON object:
{
  "text_query": "<concise provider query in the query's own language>",
  "region": "<ISO-3166-1 alpha-2 or null>",
  "language": "<ISO-639-1 of the query>",
  "required_terms": ["<cuisine/dish terms that MUST match>", ...],
  "preferred_terms": ["<terms that are nice to match>", ...],
  "strictness": "STRICT" | "RELAX_IF_EMPTY",
  "type_hint": "<place type like restaurant, cafe, bar, or null>"
}

Rules:
- Keep the explicit city in text_query when the user wrote one.
- required_terms only for cuisines/dishes the user demanded; an empty list is fine.
- "STRICT" only when relaxing would betray the request (e.g. dietary needs).
- Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct TextSearchMapRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_hint: Option<String>,
}

impl LlmScenarioRequest for TextSearchMapRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::RouteMapper
    }

    fn system_prompt(&self) -> String {
        TEXT_SEARCH_PROMPT.to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextSearchMapResponse {
    #[serde(default)]
    pub text_query: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub required_terms: Vec<String>,
    #[serde(default)]
    pub preferred_terms: Vec<String>,
    #[serde(default)]
    pub strictness: Option<String>,
    #[serde(default)]
    pub type_hint: Option<String>,
}

// ============================================================================
// Nearby mapper
// ============================================================================

const NEARBY_PROMPT: &str = r#"Plan a nearby search around the user's position for a restaurant query. Respond with a single JSON object:
{
  "radius_meters": <walking-appropriate radius, 300-5000>,
  "keyword": "<single cuisine/dish keyword or null>",
  "region": "<ISO-3166-1 alpha-2 or null>",
  "language": "<ISO-639-1 of the query>"
}

Rules:
- Small radius (300-1000) for "closest"/"walking distance" phrasing, larger otherwise.
- keyword is a legacy fallback only; one word, query language.
- Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct NearbyMapRequest {
    pub query: String,
    pub center: LatLng,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_hint: Option<String>,
}

impl LlmScenarioRequest for NearbyMapRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::RouteMapper
    }

    fn system_prompt(&self) -> String {
        NEARBY_PROMPT.to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NearbyMapResponse {
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

// ============================================================================
// Landmark mapper
// ============================================================================

const LANDMARK_PROMPT: &str = r#"Plan a search around a named landmark for a restaurant query. Respond with a single JSON object:
{
  "geocode_query": "<landmark name suitable for geocoding, in English when possible>",
  "radius_meters": <300-3000>,
  "keyword": "<single cuisine/dish keyword or null>",
  "region": "<ISO-3166-1 alpha-2 of the landmark's country, or null>",
  "language": "<ISO-639-1 of the query>"
}

Rules:
- geocode_query names only the landmark ("Eiffel Tower Paris"), never the cuisine.
- Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct LandmarkMapRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_hint: Option<String>,
}

impl LlmScenarioRequest for LandmarkMapRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::RouteMapper
    }

    fn system_prompt(&self) -> String {
        LANDMARK_PROMPT.to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LandmarkMapResponse {
    #[serde(default)]
    pub geocode_query: Option<String>,
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

// ============================================================================
// Canonical-query rewrite (secondary, cached)
// ============================================================================

const REWRITE_PROMPT: &str = r#"Rewrite a restaurant-search query to its canonical short form in the same language: cuisine keyword plus explicit city if present, nothing else. Respond with a single JSON object:
{"canonical": "<rewritten query>", "confidence": <0.0-1.0>}

Examples: "מסעדה איטלקית רומנטית בגדרה" -> "איטלקי בגדרה"; "really good sushi places in Paris" -> "sushi in Paris".
Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct QueryRewriteRequest {
    pub query: String,
}

impl LlmScenarioRequest for QueryRewriteRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::QueryRewrite
    }

    fn system_prompt(&self) -> String {
        REWRITE_PROMPT.to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRewriteResponse {
    pub canonical: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_search_response_tolerates_missing_fields() {
        let raw = r#"{"text_query": "איטלקי בגדרה"}"#;
        let response: TextSearchMapResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text_query.as_deref(), Some("איטלקי בגדרה"));
        assert!(response.required_terms.is_empty());
        assert!(response.strictness.is_none());
    }

    #[test]
    fn nearby_response_parses() {
        let raw = r#"{"radius_meters": 800, "keyword": "sushi", "region": "IL", "language": "en"}"#;
        let response: NearbyMapResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.radius_meters, Some(800.0));
    }
}
