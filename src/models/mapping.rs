//! Route plans and ranking profiles
//!
//! A [`Mapping`] describes exactly how the places provider will be called
//! for one request. The three variants converge from the route-specific
//! mappers and are consumed by the provider stage unchanged.

use serde::{Deserialize, Serialize};

use super::language::Language;
use super::place::LatLng;

// ============================================================================
// Routes and intent reasons
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Route {
    TextSearch,
    Nearby,
    Landmark,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextSearch => "TEXTSEARCH",
            Self::Nearby => "NEARBY",
            Self::Landmark => "LANDMARK",
        }
    }
}

/// Why the intent classifier chose its route. Feeds ranking-profile
/// selection and distance-origin resolution; never anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentReason {
    NearbyIntent,
    ProximityKeywords,
    SmallRadiusDetected,
    UserLocationPrimary,
    ExplicitCityMentioned,
    LandmarkMentioned,
    Default,
}

impl IntentReason {
    /// Reasons that imply the user cares about walking distance.
    pub fn is_proximity(&self) -> bool {
        matches!(
            self,
            Self::NearbyIntent
                | Self::ProximityKeywords
                | Self::SmallRadiusDetected
                | Self::UserLocationPrimary
        )
    }
}

// ============================================================================
// Plans
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strictness {
    Strict,
    RelaxIfEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CircleBias {
    pub center: LatLng,
    pub radius_meters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextSearchPlan {
    pub text_query: String,
    pub region_code: String,
    pub search_language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_bias: Option<CircleBias>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_terms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_terms: Vec<String>,
    pub strictness: Strictness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NearbyPlan {
    pub center: LatLng,
    pub radius_meters: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_key: Option<String>,
    pub region_code: String,
    pub search_language: Language,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkPlan {
    /// Canonical landmark token, e.g. `eiffel-tower-paris`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmark_id: Option<String>,
    /// Free-text geocode query when the landmark is not in the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geocode_query: Option<String>,
    /// Known coordinates, present when the registry (or geocoder) resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_lat_lng: Option<LatLng>,
    pub radius_meters: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_key: Option<String>,
    pub region_code: String,
    pub search_language: Language,
}

/// The provider call plan, one variant per route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "route", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mapping {
    TextSearch(TextSearchPlan),
    Nearby(NearbyPlan),
    Landmark(LandmarkPlan),
}

impl Mapping {
    pub fn route(&self) -> Route {
        match self {
            Self::TextSearch(_) => Route::TextSearch,
            Self::Nearby(_) => Route::Nearby,
            Self::Landmark(_) => Route::Landmark,
        }
    }

    pub fn search_language(&self) -> Language {
        match self {
            Self::TextSearch(p) => p.search_language,
            Self::Nearby(p) => p.search_language,
            Self::Landmark(p) => p.search_language,
        }
    }

    pub fn region_code(&self) -> &str {
        match self {
            Self::TextSearch(p) => &p.region_code,
            Self::Nearby(p) => &p.region_code,
            Self::Landmark(p) => &p.region_code,
        }
    }

    pub fn cuisine_key(&self) -> Option<&str> {
        match self {
            Self::TextSearch(p) => p.cuisine_key.as_deref(),
            Self::Nearby(p) => p.cuisine_key.as_deref(),
            Self::Landmark(p) => p.cuisine_key.as_deref(),
        }
    }
}

/// Provider `includedTypes` derivation. Always from the canonical cuisine or
/// type token, never from a raw keyword.
pub fn included_types(cuisine_key: Option<&str>, type_key: Option<&str>) -> Vec<String> {
    if let Some(cuisine) = cuisine_key {
        return vec![format!("{cuisine}_restaurant"), "restaurant".to_string()];
    }
    if let Some(type_key) = type_key {
        return vec![type_key.to_string()];
    }
    vec!["restaurant".to_string()]
}

// ============================================================================
// Ranking profiles
// ============================================================================

/// Fixed component weights. Each profile sums to 1.0; the distance weight is
/// zeroed at scoring time when no distance origin exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankingWeights {
    pub rating: f64,
    pub reviews: f64,
    pub distance: f64,
    pub open_boost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingProfile {
    Balanced,
    Nearby,
    NoLocation,
}

impl RankingProfile {
    pub fn weights(&self) -> RankingWeights {
        match self {
            Self::Balanced => {
                RankingWeights { rating: 0.30, reviews: 0.25, distance: 0.35, open_boost: 0.10 }
            }
            Self::Nearby => {
                RankingWeights { rating: 0.15, reviews: 0.10, distance: 0.65, open_boost: 0.10 }
            }
            Self::NoLocation => {
                RankingWeights { rating: 0.45, reviews: 0.45, distance: 0.00, open_boost: 0.10 }
            }
        }
    }

    /// Deterministic profile selection. Checked top-down; the first match
    /// wins. Never derived from language or from any LLM output beyond the
    /// already-validated intent reason.
    pub fn select(route: Route, has_user_location: bool, intent_reason: IntentReason) -> Self {
        if !has_user_location {
            return Self::NoLocation;
        }
        if route == Route::Nearby {
            return Self::Nearby;
        }
        if intent_reason.is_proximity() {
            return Self::Nearby;
        }
        Self::Balanced
    }
}

// ============================================================================
// Distance origin
// ============================================================================

/// Where ranking distance is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceOrigin {
    CityCenter { center: LatLng },
    UserLocation { center: LatLng },
    None,
}

impl DistanceOrigin {
    /// Resolution order: an explicitly mentioned, geocoded city wins over
    /// the user's own location; with neither, distance is excluded from
    /// scoring entirely.
    pub fn resolve(
        intent_reason: IntentReason,
        city_center: Option<LatLng>,
        user_location: Option<LatLng>,
    ) -> Self {
        if intent_reason == IntentReason::ExplicitCityMentioned {
            if let Some(center) = city_center {
                return Self::CityCenter { center };
            }
        }
        if let Some(center) = user_location {
            return Self::UserLocation { center };
        }
        Self::None
    }

    pub fn reference(&self) -> Option<LatLng> {
        match self {
            Self::CityCenter { center } | Self::UserLocation { center } => Some(*center),
            Self::None => None,
        }
    }
}
