//! Normalised place records
//!
//! Every provider result is converted to [`Place`] at the provider boundary;
//! all downstream stages (enforcement, filtering, ranking, responses)
//! operate on this record only.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Coordinates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_meters(&self, other: &LatLng) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Bucket coordinates to a coarse grid cell for dedup and cache keys.
    /// Two locations in the same cell are treated as the same anchor.
    pub fn bucket_key(&self) -> String {
        format!("{:.2},{:.2}", self.lat, self.lng)
    }
}

// ============================================================================
// Opening hours
// ============================================================================

/// A weekly opening window. `day` is 0 (Sunday) through 6, times are minutes
/// from midnight local to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OpenPeriod {
    pub day: u8,
    pub open_minute: u16,
    pub close_minute: u16,
}

/// Opening-hours data as reported by the provider. `open_now` is the
/// provider's own snapshot; `periods` allow point-in-time checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpeningHours {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_now: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub periods: Vec<OpenPeriod>,
}

impl OpeningHours {
    pub fn is_open_now(&self) -> Option<bool> {
        self.open_now
    }

    /// Whether the venue is open at `at`. Returns `None` when no period data
    /// is available, so callers can keep unknown-hour places.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> Option<bool> {
        if self.periods.is_empty() {
            return None;
        }
        let day = at.weekday().num_days_from_sunday() as u8;
        let minute = (at.hour() * 60 + at.minute()) as u16;
        let open = self.periods.iter().any(|p| {
            if p.close_minute >= p.open_minute {
                p.day == day && minute >= p.open_minute && minute < p.close_minute
            } else {
                // Window crosses midnight.
                (p.day == day && minute >= p.open_minute)
                    || (p.day == (day + 6) % 7 && minute < p.close_minute)
            }
        });
        Some(open)
    }
}

// ============================================================================
// Place
// ============================================================================

/// A venue candidate, normalised from the provider response.
///
/// `rating`, `user_ratings_total`, `price_level`, and `opening_hours` are all
/// optional: venues with missing attributes survive every soft filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat_lng: Option<LatLng>,
    /// 0.0..=5.0 when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ratings_total: Option<u32>,
    /// 1..=4 when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<OpeningHours>,
}

impl Place {
    pub fn open_now(&self) -> Option<bool> {
        self.opening_hours.as_ref().and_then(|h| h.is_open_now())
    }

    pub fn open_at(&self, at: DateTime<Utc>) -> Option<bool> {
        self.opening_hours.as_ref().and_then(|h| h.is_open_at(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn haversine_tel_aviv_to_jerusalem() {
        let tlv = LatLng::new(32.0853, 34.7818);
        let jlm = LatLng::new(31.7683, 35.2137);
        let d = tlv.distance_meters(&jlm);
        assert!((50_000.0..60_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn bucket_key_groups_nearby_points() {
        let a = LatLng::new(32.0853, 34.7818);
        let b = LatLng::new(32.0861, 34.7822);
        assert_eq!(a.bucket_key(), b.bucket_key());
        let far = LatLng::new(32.20, 34.78);
        assert_ne!(a.bucket_key(), far.bucket_key());
    }

    #[test]
    fn open_at_handles_midnight_crossing() {
        let hours = OpeningHours {
            open_now: None,
            // Friday 18:00 to Saturday 02:00.
            periods: vec![OpenPeriod { day: 5, open_minute: 18 * 60, close_minute: 2 * 60 }],
        };
        // Friday 23:00 UTC (2024-01-05 is a Friday).
        let friday_late = Utc.with_ymd_and_hms(2024, 1, 5, 23, 0, 0).unwrap();
        assert_eq!(hours.is_open_at(friday_late), Some(true));
        // Saturday 01:30.
        let sat_early = Utc.with_ymd_and_hms(2024, 1, 6, 1, 30, 0).unwrap();
        assert_eq!(hours.is_open_at(sat_early), Some(true));
        // Saturday 03:00 is past close.
        let sat_later = Utc.with_ymd_and_hms(2024, 1, 6, 3, 0, 0).unwrap();
        assert_eq!(hours.is_open_at(sat_later), Some(false));
    }

    #[test]
    fn open_at_is_unknown_without_periods() {
        let hours = OpeningHours { open_now: Some(true), periods: vec![] };
        assert_eq!(hours.is_open_at(Utc::now()), None);
        assert_eq!(hours.is_open_now(), Some(true));
    }
}
