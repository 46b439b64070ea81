//! Requery decision
//!
//! Pure comparison of the previous candidate pool's context against the
//! incoming one. Hard differences (query, route, anchor, radius) force a
//! provider call; soft-only differences reuse the pool and re-apply local
//! filters. Every decision is logged with its reason string.

use crate::models::{Anchor, SearchContext};

/// Movement beyond this distance makes a user-location anchor materially
/// different.
const MAX_LOCATION_DELTA_METERS: f64 = 500.0;

/// Radius change beyond this fraction forces a provider call.
const MAX_RADIUS_DELTA_FRACTION: f64 = 0.5;

/// A filtered pool smaller than this is considered exhausted.
const MIN_USEFUL_POOL: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Pool size after the current soft filters were applied to it.
    pub filtered_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeryDecision {
    pub do_provider_call: bool,
    pub reason: &'static str,
}

fn anchors_differ(prev: &Anchor, next: &Anchor) -> Option<&'static str> {
    match (prev, next) {
        (Anchor::City { text: a, .. }, Anchor::City { text: b, .. }) => {
            (a != b).then_some("city_changed")
        }
        (Anchor::User { location: a }, Anchor::User { location: b }) => {
            (a.distance_meters(b) > MAX_LOCATION_DELTA_METERS).then_some("location_moved")
        }
        (Anchor::None, Anchor::None) => None,
        _ => Some("anchor_changed"),
    }
}

/// Decide whether the provider must be called again.
pub fn decide(
    prev: Option<&SearchContext>,
    next: &SearchContext,
    pool_stats: Option<PoolStats>,
) -> RequeryDecision {
    let decision = decide_inner(prev, next, pool_stats);
    tracing::info!(
        "requery_decision do_provider_call={} reason={}",
        decision.do_provider_call,
        decision.reason
    );
    decision
}

fn decide_inner(
    prev: Option<&SearchContext>,
    next: &SearchContext,
    pool_stats: Option<PoolStats>,
) -> RequeryDecision {
    let Some(prev) = prev else {
        return RequeryDecision { do_provider_call: true, reason: "no_prior_pool" };
    };

    if prev.query_text != next.query_text {
        return RequeryDecision { do_provider_call: true, reason: "query_changed" };
    }
    if prev.route != next.route {
        return RequeryDecision { do_provider_call: true, reason: "route_changed" };
    }
    if let Some(reason) = anchors_differ(&prev.anchor, &next.anchor) {
        return RequeryDecision { do_provider_call: true, reason };
    }
    if prev.region_code != next.region_code {
        return RequeryDecision { do_provider_call: true, reason: "region_changed" };
    }
    if prev.radius_meters > 0.0 {
        let delta = (next.radius_meters - prev.radius_meters).abs() / prev.radius_meters;
        if delta > MAX_RADIUS_DELTA_FRACTION {
            return RequeryDecision { do_provider_call: true, reason: "radius_changed" };
        }
    }
    if let Some(stats) = pool_stats {
        if stats.filtered_size < MIN_USEFUL_POOL {
            return RequeryDecision { do_provider_call: true, reason: "pool_exhausted" };
        }
    }

    RequeryDecision { do_provider_call: false, reason: "soft_filters_only" }
}
