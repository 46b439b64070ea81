//! Deterministic ranking
//!
//! Pure weighted scoring over the filtered candidates. No I/O, no model
//! calls, no language anywhere in the inputs: the same places with the same
//! profile and distance origin produce the same order, every time.

use crate::models::{
    DistanceOrigin, OrderExplain, Place, RankedPlace, RankingProfile, ScoreBreakdown,
};

/// How many leading places get a full score breakdown in the response.
const BREAKDOWN_TOP_N: usize = 10;

struct ScoredPlace {
    place: Place,
    score: f64,
    distance_meters: Option<f64>,
    breakdown: ScoreBreakdown,
}

fn score_place(
    place: &Place,
    profile: RankingProfile,
    origin: &DistanceOrigin,
) -> (f64, Option<f64>, ScoreBreakdown) {
    let mut weights = profile.weights();
    let reference = origin.reference();
    if reference.is_none() {
        // Without a distance origin the distance term is excluded; the
        // ordering is invariant under the resulting < 1.0 weight sum.
        weights.distance = 0.0;
    }

    let rating_norm = place.rating.map(|r| r / 5.0).unwrap_or(0.0);
    let reviews_norm = place
        .user_ratings_total
        .map(|n| ((n as f64) + 1.0).log10() / 5.0)
        .unwrap_or(0.0);

    let distance_meters = match (reference, place.lat_lng) {
        (Some(origin), Some(at)) => Some(origin.distance_meters(&at)),
        _ => None,
    };
    let distance_norm = distance_meters
        .map(|m| 1.0 / (1.0 + m / 1000.0))
        .unwrap_or(0.0);

    let open_norm = match place.open_now() {
        Some(true) => 1.0,
        Some(false) => 0.0,
        None => 0.5,
    };

    let rating_component = weights.rating * rating_norm;
    let reviews_component = weights.reviews * reviews_norm;
    let distance_component = weights.distance * distance_norm;
    let open_component = weights.open_boost * open_norm;
    let total = rating_component + reviews_component + distance_component + open_component;

    let breakdown = ScoreBreakdown {
        place_id: place.place_id.clone(),
        rating_component,
        reviews_component,
        distance_component,
        open_component,
        total,
        rating: place.rating,
        reviews: place.user_ratings_total,
        distance_meters,
        open_now: place.open_now(),
    };

    (total, distance_meters, breakdown)
}

/// Rank `places` under `profile` measured from `origin`.
pub fn rank(
    places: Vec<Place>,
    profile: RankingProfile,
    origin: DistanceOrigin,
) -> (Vec<RankedPlace>, OrderExplain) {
    let input_order: Vec<String> = places.iter().map(|p| p.place_id.clone()).collect();

    let mut scored: Vec<ScoredPlace> = places
        .into_iter()
        .map(|place| {
            let (score, distance_meters, breakdown) = score_place(&place, profile, &origin);
            ScoredPlace { place, score, distance_meters, breakdown }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ar = a.place.user_ratings_total.unwrap_or(0);
                let br = b.place.user_ratings_total.unwrap_or(0);
                br.cmp(&ar)
            })
            .then_with(|| a.place.place_id.cmp(&b.place.place_id))
    });

    let reordered = scored
        .iter()
        .map(|s| s.place.place_id.as_str())
        .ne(input_order.iter().map(String::as_str));

    let mut weights = profile.weights();
    if origin.reference().is_none() {
        weights.distance = 0.0;
    }

    let distance_origin = match origin {
        DistanceOrigin::CityCenter { .. } => "CITY_CENTER",
        DistanceOrigin::UserLocation { .. } => "USER_LOCATION",
        DistanceOrigin::None => "NONE",
    };

    let order_explain = OrderExplain {
        profile,
        weights,
        distance_origin: distance_origin.to_string(),
        distance_ref: origin.reference(),
        reordered,
        top_breakdown: scored
            .iter()
            .take(BREAKDOWN_TOP_N)
            .map(|s| s.breakdown.clone())
            .collect(),
    };

    let ranked = scored
        .into_iter()
        .map(|s| RankedPlace { place: s.place, score: s.score, distance_meters: s.distance_meters })
        .collect();

    (ranked, order_explain)
}
