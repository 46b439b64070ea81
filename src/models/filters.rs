//! Soft filters and constraint buckets
//!
//! The LLM stages emit intent buckets only; the numeric thresholds behind
//! each bucket live here and nowhere else. Filtering on these attributes
//! never removes a place whose attribute is missing.

use serde::{Deserialize, Serialize};

// ============================================================================
// Buckets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpenState {
    OpenNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceIntent {
    Cheap,
    Moderate,
    Expensive,
}

impl PriceIntent {
    /// Provider price levels (1..=4) admitted by this intent.
    pub fn allowed_levels(&self) -> &'static [u8] {
        match self {
            Self::Cheap => &[1, 2],
            Self::Moderate => &[2, 3],
            Self::Expensive => &[3, 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum RatingBucket {
    R35,
    R40,
    R45,
}

impl RatingBucket {
    pub fn min_rating(&self) -> f64 {
        match self {
            Self::R35 => 3.5,
            Self::R40 => 4.0,
            Self::R45 => 4.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum ReviewCountBucket {
    C25,
    C100,
    C500,
}

impl ReviewCountBucket {
    pub fn min_reviews(&self) -> u32 {
        match self {
            Self::C25 => 25,
            Self::C100 => 100,
            Self::C500 => 500,
        }
    }
}

// ============================================================================
// Dietary flags
// ============================================================================

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "camelCase", default)]
pub struct DietaryFlags {
    pub kosher: bool,
    pub halal: bool,
    pub vegan: bool,
    pub vegetarian: bool,
    pub gluten_free: bool,
}

impl DietaryFlags {
    pub fn any(&self) -> bool {
        self.kosher || self.halal || self.vegan || self.vegetarian || self.gluten_free
    }

    /// Keyword tokens a place must mention (name or types) to pass the
    /// corresponding flag. Matching is substring-based and lowercase.
    pub fn required_tokens(&self) -> Vec<&'static str> {
        let mut tokens = Vec::new();
        if self.kosher {
            tokens.push("kosher");
        }
        if self.halal {
            tokens.push("halal");
        }
        if self.vegan {
            tokens.push("vegan");
        }
        if self.vegetarian {
            tokens.push("vegetarian");
        }
        if self.gluten_free {
            tokens.push("gluten");
        }
        tokens
    }
}

// ============================================================================
// Soft filter set
// ============================================================================

/// A clock-time window in minutes from midnight, used for "open between"
/// style requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start_minute: u16,
    pub end_minute: u16,
}

/// The full soft-filter set resolved for a request. All fields narrow the
/// candidate pool locally; none of them forces a new provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SoftFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_state: Option<OpenState>,
    /// Epoch milliseconds the venue must be open at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_between: Option<TimeWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_intent: Option<PriceIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<RatingBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_review_count: Option<ReviewCountBucket>,
    pub dietary: DietaryFlags,
}

impl SoftFilters {
    pub fn is_empty(&self) -> bool {
        self.open_state.is_none()
            && self.open_at.is_none()
            && self.open_between.is_none()
            && self.price_intent.is_none()
            && self.min_rating.is_none()
            && self.min_review_count.is_none()
            && !self.dietary.any()
    }

    /// Stable signature for dedup keys and context comparison. Field order
    /// is fixed; changing it would invalidate every idempotency key.
    pub fn signature(&self) -> String {
        let open = match (self.open_state, self.open_at, self.open_between) {
            (Some(OpenState::OpenNow), _, _) => "now".to_string(),
            (_, Some(at), _) => format!("at:{at}"),
            (_, _, Some(w)) => format!("btw:{}-{}", w.start_minute, w.end_minute),
            _ => "-".to_string(),
        };
        let price = self
            .price_intent
            .map(|p| format!("{p:?}").to_lowercase())
            .unwrap_or_else(|| "-".into());
        let rating = self.min_rating.map(|r| format!("{r:?}")).unwrap_or_else(|| "-".into());
        let reviews =
            self.min_review_count.map(|c| format!("{c:?}")).unwrap_or_else(|| "-".into());
        let d = &self.dietary;
        let dietary = format!(
            "{}{}{}{}{}",
            d.kosher as u8, d.halal as u8, d.vegan as u8, d.vegetarian as u8, d.gluten_free as u8
        );
        format!("{open}|{price}|{rating}|{reviews}|{dietary}")
    }
}

// ============================================================================
// Explicit constraints
// ============================================================================

/// Explicit user constraints surfaced by the constraint-extraction stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PostConstraints {
    pub dietary: DietaryFlags,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accessibility: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must_have_keywords: Vec<String>,
}
