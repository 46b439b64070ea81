//! Cuisine-enforcement scenario
//!
//! Semantic filter for explicit-cuisine queries. The model judges every
//! candidate against the required terms and returns three keep-lists; the
//! relaxation ladder is applied locally so exactly one relaxation step can
//! run. There are no hardcoded cuisine tables anywhere in this path.

use serde::{Deserialize, Serialize};

use crate::models::{Place, Strictness};
use crate::services::llm::models::{LlmScenario, LlmScenarioRequest};

const SYSTEM_PROMPT: &str = r#"You filter restaurant candidates against required cuisine terms. For each place you receive id, name, types and address. Respond with a single JSON object:
{
  "strict_keep": ["<place_id>", ...],
  "preferred_keep": ["<place_id>", ...],
  "broadened_keep": ["<place_id>", ...]
}

Rules:
- strict_keep: places whose name/types/address strongly match ALL required terms.
- preferred_keep: additional places matching any preferred term (exclude ids already in strict_keep).
- broadened_keep: additional places in the same broad food category (exclude ids already listed).
- Preserve the input order within each list.
- Judge semantically across languages ("פיצה" matches "Pizzeria Roma").
- Never answer anything except the JSON object."#;

/// Condensed candidate sent to the model.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateForEnforcement {
    pub id: String,
    pub name: String,
    pub types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl From<&Place> for CandidateForEnforcement {
    fn from(place: &Place) -> Self {
        Self {
            id: place.place_id.clone(),
            name: place.name.clone(),
            types: place.types.clone(),
            address: place.address.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CuisineEnforcementRequest {
    pub required_terms: Vec<String>,
    pub preferred_terms: Vec<String>,
    pub candidates: Vec<CandidateForEnforcement>,
}

impl LlmScenarioRequest for CuisineEnforcementRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::CuisineEnforcer
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CuisineEnforcementResponse {
    #[serde(default)]
    pub strict_keep: Vec<String>,
    #[serde(default)]
    pub preferred_keep: Vec<String>,
    #[serde(default)]
    pub broadened_keep: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxStrategy {
    FallbackPreferred,
    DropRequiredOnce,
}

/// Outcome of enforcement after the local relaxation ladder.
#[derive(Debug, Clone)]
pub struct EnforcementOutcome {
    /// Ordered place ids to keep.
    pub keep: Vec<String>,
    pub relax_applied: bool,
    pub relax_strategy: Option<RelaxStrategy>,
    /// Set when the model failed and all input places pass through.
    pub enforcement_failed: bool,
}

/// Threshold below which one relaxation step is attempted.
const MIN_KEPT: usize = 5;

impl EnforcementOutcome {
    /// Compose the model's keep-lists under the declared strictness.
    /// At most one relaxation step runs: preferred-term matches first, the
    /// broadened category only when preferred matches did not exist.
    pub fn from_response(response: CuisineEnforcementResponse, strictness: Strictness) -> Self {
        let mut keep = response.strict_keep.clone();

        let relax_allowed = strictness == Strictness::RelaxIfEmpty || keep.is_empty();
        if keep.len() >= MIN_KEPT || !relax_allowed {
            return Self { keep, relax_applied: false, relax_strategy: None, enforcement_failed: false };
        }

        if !response.preferred_keep.is_empty() {
            keep.extend(response.preferred_keep);
            return Self {
                keep,
                relax_applied: true,
                relax_strategy: Some(RelaxStrategy::FallbackPreferred),
                enforcement_failed: false,
            };
        }

        if !response.broadened_keep.is_empty() {
            keep.extend(response.broadened_keep);
            return Self {
                keep,
                relax_applied: true,
                relax_strategy: Some(RelaxStrategy::DropRequiredOnce),
                enforcement_failed: false,
            };
        }

        Self { keep, relax_applied: false, relax_strategy: None, enforcement_failed: false }
    }

    /// Model failure: pass every input place through unchanged and flag it.
    pub fn pass_through(places: &[Place]) -> Self {
        Self {
            keep: places.iter().map(|p| p.place_id.clone()).collect(),
            relax_applied: false,
            relax_strategy: None,
            enforcement_failed: true,
        }
    }

    /// Apply the keep-list, preserving its order. Ids the model invented
    /// are ignored.
    pub fn apply(&self, places: Vec<Place>) -> Vec<Place> {
        let mut by_id: std::collections::HashMap<String, Place> =
            places.into_iter().map(|p| (p.place_id.clone(), p)).collect();
        self.keep.iter().filter_map(|id| by_id.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{i}")).collect()
    }

    #[test]
    fn enough_strict_matches_need_no_relaxation() {
        let outcome = EnforcementOutcome::from_response(
            CuisineEnforcementResponse {
                strict_keep: ids(6),
                preferred_keep: vec!["x".to_string()],
                broadened_keep: vec![],
            },
            Strictness::RelaxIfEmpty,
        );
        assert_eq!(outcome.keep.len(), 6);
        assert!(!outcome.relax_applied);
    }

    #[test]
    fn sparse_strict_falls_back_to_preferred_first() {
        let outcome = EnforcementOutcome::from_response(
            CuisineEnforcementResponse {
                strict_keep: ids(2),
                preferred_keep: vec!["q1".to_string(), "q2".to_string()],
                broadened_keep: vec!["b1".to_string()],
            },
            Strictness::RelaxIfEmpty,
        );
        assert_eq!(outcome.keep.len(), 4);
        assert_eq!(outcome.relax_strategy, Some(RelaxStrategy::FallbackPreferred));
        // The broadened list was NOT also applied: one step only.
        assert!(!outcome.keep.contains(&"b1".to_string()));
    }

    #[test]
    fn broadening_is_the_second_choice() {
        let outcome = EnforcementOutcome::from_response(
            CuisineEnforcementResponse {
                strict_keep: ids(1),
                preferred_keep: vec![],
                broadened_keep: vec!["b1".to_string(), "b2".to_string()],
            },
            Strictness::RelaxIfEmpty,
        );
        assert_eq!(outcome.relax_strategy, Some(RelaxStrategy::DropRequiredOnce));
        assert_eq!(outcome.keep.len(), 3);
    }

    #[test]
    fn strict_mode_relaxes_only_from_empty() {
        // 2 matches under STRICT: kept as-is, no relaxation.
        let outcome = EnforcementOutcome::from_response(
            CuisineEnforcementResponse {
                strict_keep: ids(2),
                preferred_keep: vec!["q1".to_string()],
                broadened_keep: vec![],
            },
            Strictness::Strict,
        );
        assert_eq!(outcome.keep.len(), 2);
        assert!(!outcome.relax_applied);

        // Zero matches under STRICT: one relaxation step still runs.
        let outcome = EnforcementOutcome::from_response(
            CuisineEnforcementResponse {
                strict_keep: vec![],
                preferred_keep: vec!["q1".to_string()],
                broadened_keep: vec![],
            },
            Strictness::Strict,
        );
        assert!(outcome.relax_applied);
    }

    #[test]
    fn pass_through_keeps_everything_and_flags() {
        let places = vec![place("a"), place("b")];
        let outcome = EnforcementOutcome::pass_through(&places);
        assert!(outcome.enforcement_failed);
        assert_eq!(outcome.apply(places).len(), 2);
    }

    #[test]
    fn apply_preserves_keep_order_and_drops_invented_ids() {
        let places = vec![place("a"), place("b"), place("c")];
        let outcome = EnforcementOutcome {
            keep: vec!["c".to_string(), "a".to_string(), "ghost".to_string()],
            relax_applied: false,
            relax_strategy: None,
            enforcement_failed: false,
        };
        let kept = outcome.apply(places);
        let kept_ids: Vec<&str> = kept.iter().map(|p| p.place_id.as_str()).collect();
        assert_eq!(kept_ids, vec!["c", "a"]);
    }
}
