//! Local soft filtering with deterministic relaxation
//!
//! Applies the resolved soft filters to the candidate pool using the bucket
//! threshold tables. A place with a missing attribute always survives the
//! filter on that attribute. When fewer than five places remain and a
//! relaxable filter is set, filters are dropped one group at a time —
//! open-state first, then dietary, then minimum rating — re-applying at
//! most twice.

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{DietaryFlags, OpenState, Place, SoftFilters, TimeWindow};

/// Result size below which relaxation kicks in.
const MIN_RESULTS: usize = 5;

/// Maximum number of relax-and-reapply rounds.
const MAX_RELAX_ROUNDS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaxStep {
    pub step: usize,
    pub field: &'static str,
    pub from: String,
    pub to: String,
}

fn window_overlaps(place: &Place, window: &TimeWindow) -> Option<bool> {
    let hours = place.opening_hours.as_ref()?;
    if hours.periods.is_empty() {
        return None;
    }
    let overlaps = hours.periods.iter().any(|p| {
        if p.close_minute >= p.open_minute {
            p.open_minute < window.end_minute && window.start_minute < p.close_minute
        } else {
            // Crosses midnight: open tail or early-morning head.
            p.open_minute < window.end_minute || window.start_minute < p.close_minute
        }
    });
    Some(overlaps)
}

fn passes_dietary(place: &Place, dietary: &DietaryFlags) -> bool {
    if !dietary.any() {
        return true;
    }
    let haystack = format!(
        "{} {}",
        place.name.to_lowercase(),
        place.types.join(" ").to_lowercase()
    );
    dietary.required_tokens().iter().all(|token| haystack.contains(token))
}

/// Whether `place` passes `filters`. Missing attributes never fail a check.
fn passes(place: &Place, filters: &SoftFilters, now: DateTime<Utc>) -> bool {
    if filters.open_state == Some(OpenState::OpenNow) {
        if place.open_now() == Some(false) {
            return false;
        }
    }
    if let Some(open_at_ms) = filters.open_at {
        if let Some(at) = Utc.timestamp_millis_opt(open_at_ms).single() {
            if place.open_at(at) == Some(false) {
                return false;
            }
        }
    }
    if let Some(window) = &filters.open_between {
        if window_overlaps(place, window) == Some(false) {
            return false;
        }
    }
    if let Some(intent) = filters.price_intent {
        if let Some(level) = place.price_level {
            if !intent.allowed_levels().contains(&level) {
                return false;
            }
        }
    }
    if let Some(bucket) = filters.min_rating {
        if let Some(rating) = place.rating {
            if rating < bucket.min_rating() {
                return false;
            }
        }
    }
    if let Some(bucket) = filters.min_review_count {
        if let Some(reviews) = place.user_ratings_total {
            if reviews < bucket.min_reviews() {
                return false;
            }
        }
    }
    if !passes_dietary(place, &filters.dietary) {
        return false;
    }
    let _ = now;
    true
}

pub fn apply(places: &[Place], filters: &SoftFilters, now: DateTime<Utc>) -> Vec<Place> {
    places
        .iter()
        .filter(|p| passes(p, filters, now))
        .cloned()
        .collect()
}

/// Filter with the relaxation ladder. Returns the surviving places, the
/// filters actually in effect at the end, and the relaxation steps taken.
pub fn apply_with_relaxation(
    places: &[Place],
    filters: &SoftFilters,
    now: DateTime<Utc>,
) -> (Vec<Place>, SoftFilters, Vec<RelaxStep>) {
    let mut effective = filters.clone();
    let mut result = apply(places, &effective, now);
    let mut steps = Vec::new();

    for round in 1..=MAX_RELAX_ROUNDS {
        if result.len() >= MIN_RESULTS {
            break;
        }
        let Some(step) = relax_next(&mut effective, round) else {
            break;
        };
        tracing::info!(
            "post_filter_relaxed step={} field={} from={} to={}",
            step.step,
            step.field,
            step.from,
            step.to
        );
        steps.push(step);
        result = apply(places, &effective, now);
    }

    (result, effective, steps)
}

/// Drop the next relaxable filter group, in the fixed order. Returns `None`
/// when nothing is left to relax.
fn relax_next(filters: &mut SoftFilters, round: usize) -> Option<RelaxStep> {
    if filters.open_state.is_some() || filters.open_at.is_some() || filters.open_between.is_some()
    {
        let from = match (filters.open_state, filters.open_at, filters.open_between) {
            (Some(OpenState::OpenNow), _, _) => "OPEN_NOW".to_string(),
            (_, Some(at), _) => format!("OPEN_AT({at})"),
            (_, _, Some(w)) => format!("OPEN_BETWEEN({}-{})", w.start_minute, w.end_minute),
            _ => unreachable!(),
        };
        filters.open_state = None;
        filters.open_at = None;
        filters.open_between = None;
        return Some(RelaxStep { step: round, field: "open_state", from, to: "null".to_string() });
    }

    if filters.dietary.any() {
        let from = format!("{:?}", filters.dietary);
        filters.dietary = DietaryFlags::default();
        return Some(RelaxStep { step: round, field: "dietary", from, to: "null".to_string() });
    }

    if let Some(bucket) = filters.min_rating.take() {
        return Some(RelaxStep {
            step: round,
            field: "min_rating_bucket",
            from: format!("{bucket:?}"),
            to: "null".to_string(),
        });
    }

    None
}
