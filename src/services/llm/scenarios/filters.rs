//! Filter-extraction scenarios
//!
//! Two concurrent LLM calls: explicit constraints (dietary, accessibility,
//! must-have keywords) and bucketed soft filters. The model only ever emits
//! enum buckets; the numeric thresholds live on the bucket types. Unknown
//! or malformed bucket values degrade to "no filter".
//!
//! Both calls are skipped entirely for generic queries; the keyword table
//! at the bottom is what decides whether the base-filter call is needed.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::models::{
    DietaryFlags, OpenState, PostConstraints, PriceIntent, RatingBucket, ReviewCountBucket,
    SoftFilters, TimeWindow,
};
use crate::services::llm::models::{LlmScenario, LlmScenarioRequest};

// ============================================================================
// Post-constraints scenario
// ============================================================================

const POST_CONSTRAINTS_PROMPT: &str = r#"Extract explicit user constraints from a restaurant-search query. Respond with a single JSON object:
{
  "dietary": {"kosher": bool, "halal": bool, "vegan": bool, "vegetarian": bool, "glutenFree": bool},
  "accessibility": ["<requirement>", ...],
  "must_have_keywords": ["<word the user explicitly demands>", ...]
}

Only mark constraints the user explicitly stated. An Italian restaurant query is not vegetarian; "kosher pizza" is kosher. Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct PostConstraintsRequest {
    pub query: String,
}

impl LlmScenarioRequest for PostConstraintsRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::PostConstraints
    }

    fn system_prompt(&self) -> String {
        POST_CONSTRAINTS_PROMPT.to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostConstraintsResponse {
    #[serde(default)]
    pub dietary: DietaryFlags,
    #[serde(default)]
    pub accessibility: Vec<String>,
    #[serde(default)]
    pub must_have_keywords: Vec<String>,
}

impl From<PostConstraintsResponse> for PostConstraints {
    fn from(r: PostConstraintsResponse) -> Self {
        Self {
            dietary: r.dietary,
            accessibility: r.accessibility,
            must_have_keywords: r.must_have_keywords,
        }
    }
}

// ============================================================================
// Base-filters scenario
// ============================================================================

const BASE_FILTERS_PROMPT: &str = r#"Extract soft filters from a restaurant-search query as intent buckets. Respond with a single JSON object:
{
  "open_state": "OPEN_NOW" | null,
  "open_at": <epoch milliseconds> | null,
  "open_between": {"startMinute": <0-1439>, "endMinute": <0-1439>} | null,
  "price_intent": "CHEAP" | "MODERATE" | "EXPENSIVE" | null,
  "min_rating_bucket": "R35" | "R40" | "R45" | null,
  "min_review_count_bucket": "C25" | "C100" | "C500" | null,
  "dietary": {"kosher": bool, "halal": bool, "vegan": bool, "vegetarian": bool, "glutenFree": bool}
}

Rules:
- Buckets only; never invent numeric thresholds. "well rated" is "R40", "best" is "R45", "popular" is "C100".
- null for everything the user did not ask for.
- Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct BaseFiltersRequest {
    pub query: String,
}

impl LlmScenarioRequest for BaseFiltersRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::BaseFilters
    }

    fn system_prompt(&self) -> String {
        BASE_FILTERS_PROMPT.to_string()
    }
}

/// Raw bucket record; string-typed fields are parsed leniently so one bad
/// bucket never discards the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseFiltersResponse {
    #[serde(default)]
    pub open_state: Option<String>,
    #[serde(default)]
    pub open_at: Option<i64>,
    #[serde(default)]
    pub open_between: Option<TimeWindow>,
    #[serde(default)]
    pub price_intent: Option<String>,
    #[serde(default)]
    pub min_rating_bucket: Option<String>,
    #[serde(default)]
    pub min_review_count_bucket: Option<String>,
    #[serde(default)]
    pub dietary: DietaryFlags,
}

impl BaseFiltersResponse {
    pub fn into_soft_filters(self) -> SoftFilters {
        let open_state = match self.open_state.as_deref().map(str::to_uppercase).as_deref() {
            Some("OPEN_NOW") => Some(OpenState::OpenNow),
            _ => None,
        };
        let price_intent = match self.price_intent.as_deref().map(str::to_uppercase).as_deref() {
            Some("CHEAP") => Some(PriceIntent::Cheap),
            Some("MODERATE") => Some(PriceIntent::Moderate),
            Some("EXPENSIVE") => Some(PriceIntent::Expensive),
            _ => None,
        };
        let min_rating = match self.min_rating_bucket.as_deref().map(str::to_uppercase).as_deref()
        {
            Some("R35") => Some(RatingBucket::R35),
            Some("R40") => Some(RatingBucket::R40),
            Some("R45") => Some(RatingBucket::R45),
            _ => None,
        };
        let min_review_count =
            match self.min_review_count_bucket.as_deref().map(str::to_uppercase).as_deref() {
                Some("C25") => Some(ReviewCountBucket::C25),
                Some("C100") => Some(ReviewCountBucket::C100),
                Some("C500") => Some(ReviewCountBucket::C500),
                _ => None,
            };
        let open_between = self
            .open_between
            .filter(|w| w.start_minute < 1440 && w.end_minute < 1440);

        SoftFilters {
            open_state,
            open_at: self.open_at,
            open_between,
            price_intent,
            min_rating,
            min_review_count,
            dietary: self.dietary,
        }
    }
}

// ============================================================================
// Skip-rule keyword table
// ============================================================================

/// Words hinting the user asked about opening hours, price, rating, review
/// volume, or distance. A generic query containing none of these skips the
/// base-filter LLM call.
static FILTER_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        // open / hours
        "open", "hours", "late", "now", "פתוח", "פתוחה", "פתוחות", "שעות", "abierto", "horario",
        "открыт", "открыто", "сейчас", "مفتوح", "ساعات", "ouvert", "horaires",
        // price
        "cheap", "expensive", "price", "budget", "זול", "זולה", "יקר", "יקרה", "מחיר", "barato",
        "caro", "precio", "дешев", "дорог", "цен", "رخيص", "غالي", "سعر", "pas cher", "cher",
        "prix",
        // rating
        "rated", "rating", "best", "top", "good", "מדורג", "דירוג", "הכי טוב", "טובה", "mejor",
        "valorado", "лучш", "рейтинг", "الأفضل", "تقييم", "meilleur", "note",
        // reviews
        "reviews", "popular", "ביקורות", "פופולרי", "reseñas", "отзыв", "популяр", "مراجعات",
        "شعبي", "avis", "populaire",
        // distance
        "near", "close", "closest", "nearby", "walking", "קרוב", "קרובה", "ליד", "הליכה", "cerca",
        "рядом", "близко", "пешком", "قريب", "بالقرب", "près", "proche", "à pied",
    ]
});

/// Whether the query mentions any open/price/rating/review/distance concept.
pub fn has_filter_keywords(query: &str) -> bool {
    let lowered = query.to_lowercase();
    FILTER_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_parse_case_insensitively() {
        let response = BaseFiltersResponse {
            open_state: Some("open_now".to_string()),
            price_intent: Some("CHEAP".to_string()),
            min_rating_bucket: Some("r40".to_string()),
            min_review_count_bucket: Some("C100".to_string()),
            ..Default::default()
        };
        let filters = response.into_soft_filters();
        assert_eq!(filters.open_state, Some(OpenState::OpenNow));
        assert_eq!(filters.price_intent, Some(PriceIntent::Cheap));
        assert_eq!(filters.min_rating, Some(RatingBucket::R40));
        assert_eq!(filters.min_review_count, Some(ReviewCountBucket::C100));
    }

    #[test]
    fn unknown_buckets_degrade_to_none() {
        let response = BaseFiltersResponse {
            open_state: Some("SOMETIMES".to_string()),
            price_intent: Some("FREE".to_string()),
            min_rating_bucket: Some("R99".to_string()),
            ..Default::default()
        };
        let filters = response.into_soft_filters();
        assert!(filters.open_state.is_none());
        assert!(filters.price_intent.is_none());
        assert!(filters.min_rating.is_none());
    }

    #[test]
    fn invalid_time_window_is_dropped() {
        let response = BaseFiltersResponse {
            open_between: Some(TimeWindow { start_minute: 9000, end_minute: 10 }),
            ..Default::default()
        };
        assert!(response.into_soft_filters().open_between.is_none());
    }

    #[test]
    fn keyword_detection_across_languages() {
        assert!(has_filter_keywords("cheap pizza"));
        assert!(has_filter_keywords("מסעדה פתוחה עכשיו"));
        assert!(has_filter_keywords("ресторан рядом"));
        assert!(has_filter_keywords("restaurant pas cher"));
        assert!(has_filter_keywords("مطعم قريب"));

        assert!(!has_filter_keywords("מה יש לאכול"));
        assert!(!has_filter_keywords("pizza"));
    }
}
