//! Query canonicalisation and cuisine-key extraction
//!
//! The cuisine key is a language-independent token derived by pattern
//! matching across the supported languages. It is the only thing allowed to
//! parameterise provider type lists and cache keys; whatever cuisine a
//! model mentions is advisory at best and this extractor wins on conflict.
//!
//! The canonical provider query stays in the query's language: the cuisine
//! key picks a fixed surface form per language, and an explicitly mentioned
//! city is carried over verbatim from the query text.

use once_cell::sync::Lazy;

use crate::models::Language;
use crate::utils::normalize_query;

/// `(canonical key, surface forms across supported languages)`. Forms are
/// matched as substrings of the normalised query; order within the table is
/// the priority order on multi-cuisine queries.
static CUISINE_PATTERNS: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "italian",
            vec![
                "italian", "italia", "איטלקי", "איטלקית", "איטלקיות", "italiano", "italiana",
                "итальянск", "إيطالي", "italien", "italienne",
            ],
        ),
        ("pizza", vec!["pizza", "פיצה", "пицц", "بيتزا"]),
        ("sushi", vec!["sushi", "סושי", "суши", "سوشي"]),
        (
            "japanese",
            vec!["japanese", "יפני", "יפנית", "japonés", "japonesa", "японск", "ياباني", "japonais"],
        ),
        (
            "chinese",
            vec!["chinese", "סיני", "סינית", "chino", "китайск", "صيني", "chinois"],
        ),
        (
            "thai",
            vec!["thai", "תאילנדי", "תאילנדית", "tailandés", "тайск", "تايلاندي", "thaïlandais"],
        ),
        (
            "indian",
            vec!["indian", "הודי", "הודית", "indio", "индийск", "هندي", "indien"],
        ),
        (
            "mexican",
            vec![
                "mexican", "מקסיקני", "מקסיקנית", "mexicano", "mexicana", "мексиканск", "مكسيكي",
                "mexicain",
            ],
        ),
        (
            "burger",
            vec!["burger", "המבורגר", "בורגר", "hamburguesa", "бургер", "برغر", "برجر"],
        ),
        (
            "seafood",
            vec![
                "seafood", "דגים", "פירות ים", "mariscos", "морепродукт", "مأكولات بحرية",
                "fruits de mer",
            ],
        ),
        ("steak", vec!["steak", "steakhouse", "סטייק", "стейк", "ستيك"]),
        (
            "vegan",
            vec!["vegan", "טבעוני", "טבעונית", "vegano", "веганск", "végétalien", "végan"],
        ),
        (
            "vegetarian",
            vec!["vegetarian", "צמחוני", "צמחונית", "vegetariano", "вегетарианск", "نباتي", "végétarien"],
        ),
        (
            "french",
            vec![
                "french", "צרפתי", "צרפתית", "francés", "francesa", "французск", "فرنسي",
                "français", "française",
            ],
        ),
        (
            "greek",
            vec!["greek", "יווני", "יוונית", "griego", "греческ", "يوناني", "grec", "grecque"],
        ),
        (
            "middle_eastern",
            vec![
                "hummus", "falafel", "shawarma", "חומוס", "פלאפל", "שווארמה", "фалафель", "хумус",
                "حمص", "فلافل", "شاورما",
            ],
        ),
        (
            "cafe",
            vec!["cafe", "coffee", "בית קפה", "קפה", "café", "кофейн", "кофе", "قهوة", "مقهى"],
        ),
        ("bakery", vec!["bakery", "מאפייה", "panadería", "пекарн", "مخبز", "boulangerie"]),
        ("bar", vec!["pub", "בר ", "פאב", "бар", "паб", "حانة", " bar"]),
    ]
});

/// Extract the canonical cuisine key from a raw query, if any.
pub fn extract_cuisine_key(query: &str) -> Option<&'static str> {
    let normalized = normalize_query(query);
    for (key, forms) in CUISINE_PATTERNS.iter() {
        if forms.iter().any(|form| normalized.contains(form)) {
            return Some(key);
        }
    }
    None
}

/// Fixed per-language surface for a cuisine key, used to rebuild the
/// canonical provider query in the query's own language. Unlisted pairs
/// fall back to the key itself.
pub fn cuisine_surface(key: &str, language: Language) -> &'static str {
    use Language::*;
    match (key, language) {
        ("italian", He) => "איטלקי",
        ("italian", Es) => "italiano",
        ("italian", Ru) => "итальянский",
        ("italian", Ar) => "إيطالي",
        ("italian", Fr) => "italien",
        ("italian", En) => "italian",
        ("pizza", He) => "פיצה",
        ("pizza", Ru) => "пицца",
        ("pizza", Ar) => "بيتزا",
        ("pizza", _) => "pizza",
        ("sushi", He) => "סושי",
        ("sushi", Ru) => "суши",
        ("sushi", Ar) => "سوشي",
        ("sushi", _) => "sushi",
        ("japanese", He) => "יפני",
        ("japanese", Es) => "japonés",
        ("japanese", Ru) => "японский",
        ("japanese", Ar) => "ياباني",
        ("japanese", Fr) => "japonais",
        ("chinese", He) => "סיני",
        ("chinese", Es) => "chino",
        ("chinese", Ru) => "китайский",
        ("chinese", Ar) => "صيني",
        ("chinese", Fr) => "chinois",
        ("burger", He) => "המבורגר",
        ("burger", Es) => "hamburguesa",
        ("burger", Ru) => "бургер",
        ("burger", Ar) => "برغر",
        ("cafe", He) => "בית קפה",
        ("cafe", Ru) => "кофейня",
        ("cafe", Ar) => "مقهى",
        ("cafe", Fr) => "café",
        ("vegan", He) => "טבעוני",
        ("vegan", Es) => "vegano",
        ("vegan", Fr) => "végétalien",
        ("vegetarian", He) => "צמחוני",
        ("vegetarian", Es) => "vegetariano",
        ("vegetarian", Fr) => "végétarien",
        ("thai", He) => "תאילנדי",
        ("indian", He) => "הודי",
        ("mexican", He) => "מקסיקני",
        ("seafood", He) => "דגים",
        ("steak", He) => "סטייק",
        ("french", He) => "צרפתי",
        ("greek", He) => "יווני",
        ("middle_eastern", He) => "חומוס",
        ("bakery", He) => "מאפייה",
        ("bar", He) => "בר",
        ("japanese", _) => "japanese",
        ("chinese", _) => "chinese",
        ("thai", _) => "thai",
        ("indian", _) => "indian",
        ("mexican", _) => "mexican",
        ("burger", _) => "burger",
        ("seafood", _) => "seafood",
        ("steak", _) => "steak",
        ("vegan", _) => "vegan",
        ("vegetarian", _) => "vegetarian",
        ("french", _) => "french",
        ("greek", _) => "greek",
        ("middle_eastern", _) => "hummus",
        ("cafe", _) => "cafe",
        ("bakery", _) => "bakery",
        ("bar", _) => "bar",
        _ => "restaurant",
    }
}

/// Find the city token as the user wrote it ("בגדרה" for city "גדרה"), so
/// the canonical query preserves the original phrasing.
fn city_token_from_query(normalized_query: &str, city_text: &str) -> Option<String> {
    let city = normalize_query(city_text);
    if city.is_empty() {
        return None;
    }
    let idx = normalized_query.find(&city)?;
    // The match must end at a token boundary.
    let tail = &normalized_query[idx + city.len()..];
    if !(tail.is_empty() || tail.starts_with(char::is_whitespace)) {
        return None;
    }
    // Walk back to the start of the whitespace-delimited token so a fused
    // preposition ("בגדרה") is kept with the city.
    let token_start = normalized_query[..idx]
        .rfind(char::is_whitespace)
        .map(|i| i + 1)
        .unwrap_or(0);
    Some(normalized_query[token_start..idx + city.len()].to_string())
}

/// Deterministic canonical form: cuisine surface in the query language plus
/// the explicit city exactly as written. Falls back to the normalised query
/// when no cuisine was recognised; the LLM rewrite (confidence-gated,
/// cached) can replace this for rephrasing-heavy traffic.
pub fn canonicalize_text_query(
    query: &str,
    city_text: Option<&str>,
    query_language: Language,
) -> String {
    let normalized = normalize_query(query);
    let Some(key) = extract_cuisine_key(query) else {
        return normalized;
    };
    let cuisine = cuisine_surface(key, query_language);

    match city_text {
        Some(city) if !normalize_query(city).is_empty() => {
            let city_token = city_token_from_query(&normalized, city)
                .unwrap_or_else(|| normalize_query(city));
            format!("{cuisine} {city_token}")
        }
        _ => cuisine.to_string(),
    }
}

/// Key under which a canonical rewrite is cached for 24 h.
pub fn canonical_cache_key(
    normalized_query_hash: &str,
    ui_language: &str,
    region_code: &str,
) -> String {
    format!("canonical_query:{normalized_query_hash}:{ui_language}:{region_code}")
}
