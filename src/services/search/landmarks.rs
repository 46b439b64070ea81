//! Landmark registry
//!
//! A small in-process table mapping multilingual landmark names to a
//! canonical landmark id, known coordinates, and a region code. Registry
//! hits skip geocoding entirely, which is what makes the landmark cache key
//! identical across query languages. Read-only after construction; built
//! once at startup and shared through the call graph.

use crate::models::LatLng;
use crate::utils::normalize_query;

#[derive(Debug, Clone)]
pub struct LandmarkEntry {
    /// Canonical token, e.g. `eiffel-tower-paris`.
    pub landmark_id: &'static str,
    pub lat_lng: LatLng,
    pub region_code: &'static str,
    /// Names and aliases across the supported languages, matched as
    /// substrings of the normalised query.
    aliases: Vec<&'static str>,
}

pub struct LandmarkRegistry {
    entries: Vec<LandmarkEntry>,
}

impl LandmarkRegistry {
    pub fn with_known_landmarks() -> Self {
        let entries = vec![
            LandmarkEntry {
                landmark_id: "eiffel-tower-paris",
                lat_lng: LatLng::new(48.8584, 2.2945),
                region_code: "FR",
                aliases: vec![
                    "eiffel tower", "tour eiffel", "מגדל אייפל", "torre eiffel",
                    "эйфелева башня", "эйфелевой башни", "برج إيفل",
                ],
            },
            LandmarkEntry {
                landmark_id: "big-ben-london",
                lat_lng: LatLng::new(51.5007, -0.1246),
                region_code: "GB",
                aliases: vec!["big ben", "ביג בן", "биг-бен", "биг бен", "بيغ بن"],
            },
            LandmarkEntry {
                landmark_id: "colosseum-rome",
                lat_lng: LatLng::new(41.8902, 12.4922),
                region_code: "IT",
                aliases: vec![
                    "colosseum", "colosseo", "קולוסיאום", "coliseo", "колизей", "الكولوسيوم",
                    "colisée",
                ],
            },
            LandmarkEntry {
                landmark_id: "sagrada-familia-barcelona",
                lat_lng: LatLng::new(41.4036, 2.1744),
                region_code: "ES",
                aliases: vec!["sagrada familia", "סגרדה פמיליה", "саграда фамилия", "ساغرادا فاميليا"],
            },
            LandmarkEntry {
                landmark_id: "brandenburg-gate-berlin",
                lat_lng: LatLng::new(52.5163, 13.3777),
                region_code: "DE",
                aliases: vec![
                    "brandenburg gate", "brandenburger tor", "שער ברנדנבורג",
                    "бранденбургские ворота", "بوابة براندنبورغ", "porte de brandebourg",
                ],
            },
            LandmarkEntry {
                landmark_id: "times-square-nyc",
                lat_lng: LatLng::new(40.7580, -73.9855),
                region_code: "US",
                aliases: vec!["times square", "טיימס סקוור", "таймс-сквер", "таймс сквер", "تايمز سكوير"],
            },
            LandmarkEntry {
                landmark_id: "western-wall-jerusalem",
                lat_lng: LatLng::new(31.7767, 35.2345),
                region_code: "IL",
                aliases: vec![
                    "western wall", "wailing wall", "הכותל", "הכותל המערבי", "стена плача",
                    "حائط البراق", "mur des lamentations",
                ],
            },
            LandmarkEntry {
                landmark_id: "azrieli-center-tel-aviv",
                lat_lng: LatLng::new(32.0740, 34.7925),
                region_code: "IL",
                aliases: vec!["azrieli", "עזריאלי", "מגדלי עזריאלי", "азриэли"],
            },
            LandmarkEntry {
                landmark_id: "louvre-paris",
                lat_lng: LatLng::new(48.8606, 2.3376),
                region_code: "FR",
                aliases: vec!["louvre", "הלובר", "лувр", "اللوفر", "musée du louvre"],
            },
            LandmarkEntry {
                landmark_id: "red-square-moscow",
                lat_lng: LatLng::new(55.7539, 37.6208),
                region_code: "RU",
                aliases: vec![
                    "red square", "הכיכר האדומה", "красная площадь", "красной площади",
                    "الساحة الحمراء", "place rouge",
                ],
            },
        ];
        Self { entries }
    }

    /// Empty registry; every landmark goes through the geocoder.
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Match a free-text query (or geocode query) against the registry.
    pub fn resolve(&self, text: &str) -> Option<&LandmarkEntry> {
        let normalized = normalize_query(text);
        self.entries
            .iter()
            .find(|entry| entry.aliases.iter().any(|alias| normalized.contains(alias)))
    }

    /// Look up by canonical id.
    pub fn by_id(&self, landmark_id: &str) -> Option<&LandmarkEntry> {
        self.entries.iter().find(|e| e.landmark_id == landmark_id)
    }

    /// Canonical id for text that is not in the registry, derived from the
    /// normalised geocode query so the same unknown landmark still shares a
    /// cache key across requests.
    pub fn fallback_id(geocode_query: &str) -> String {
        let slug: String = normalize_query(geocode_query)
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        let mut collapsed = String::with_capacity(slug.len());
        let mut last_dash = false;
        for c in slug.chars() {
            if c == '-' {
                if !last_dash {
                    collapsed.push('-');
                }
                last_dash = true;
            } else {
                collapsed.push(c);
                last_dash = false;
            }
        }
        collapsed.trim_matches('-').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multilingual_aliases_resolve_to_one_id() {
        let registry = LandmarkRegistry::with_known_landmarks();
        for query in [
            "מסעדות איטלקיות ליד מגדל אייפל",
            "Italian restaurants near Eiffel Tower",
            "Restaurants italiens près de la Tour Eiffel",
        ] {
            let entry = registry.resolve(query).expect("registry hit");
            assert_eq!(entry.landmark_id, "eiffel-tower-paris");
            assert_eq!(entry.region_code, "FR");
        }
    }

    #[test]
    fn unknown_landmark_misses() {
        let registry = LandmarkRegistry::with_known_landmarks();
        assert!(registry.resolve("restaurants near my office").is_none());
    }

    #[test]
    fn lookup_by_id() {
        let registry = LandmarkRegistry::with_known_landmarks();
        let entry = registry.by_id("western-wall-jerusalem").unwrap();
        assert_eq!(entry.region_code, "IL");
    }

    #[test]
    fn fallback_ids_are_slugs() {
        assert_eq!(
            LandmarkRegistry::fallback_id("Statue of Liberty, New York"),
            "statue-of-liberty-new-york"
        );
        assert_eq!(LandmarkRegistry::fallback_id("  weird -- name  "), "weird-name");
    }
}
