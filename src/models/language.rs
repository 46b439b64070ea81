//! Language model
//!
//! Four distinct languages are tracked per request: the UI display
//! preference, the detected language of the query text, the language used
//! for generated prose, and the language sent to the places provider.
//! Keeping them separate is what allows a Hebrew UI to carry an English
//! query without polluting provider cache keys.

use serde::{Deserialize, Serialize};

// ============================================================================
// Language codes
// ============================================================================

/// ISO-639-1 language codes handled by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    He,
    En,
    Es,
    Ru,
    Ar,
    Fr,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::He => "he",
            Self::En => "en",
            Self::Es => "es",
            Self::Ru => "ru",
            Self::Ar => "ar",
            Self::Fr => "fr",
        }
    }

    /// Parse a language code, tolerating region suffixes ("en-US" -> En).
    pub fn parse(code: &str) -> Option<Self> {
        let base = code.trim().to_lowercase();
        let base = base.split(['-', '_']).next().unwrap_or(&base);
        match base {
            "he" | "iw" => Some(Self::He),
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            "ru" => Some(Self::Ru),
            "ar" => Some(Self::Ar),
            "fr" => Some(Self::Fr),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Language policy
// ============================================================================

/// Which language is sent to the places provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderLanguagePolicy {
    /// Active policy: send the detected query language when the provider
    /// supports it, otherwise English.
    QueryLanguage,
    /// Legacy rollback: send the region's default language.
    RegionDefault,
}

impl Default for ProviderLanguagePolicy {
    fn default() -> Self {
        Self::QueryLanguage
    }
}

/// Languages the places provider accepts. Query languages outside this list
/// fall back to English for the outbound call.
pub const PROVIDER_SUPPORTED_LANGUAGES: &[Language] = &[
    Language::He,
    Language::En,
    Language::Es,
    Language::Ru,
    Language::Ar,
    Language::Fr,
];

/// Confidence threshold above which the detected query language drives
/// assistant prose instead of the UI preference.
pub const ASSISTANT_LANGUAGE_CONFIDENCE: f64 = 0.7;

// ============================================================================
// Resolved context
// ============================================================================

/// How each resolved language was chosen. Carried in the response meta so
/// clients and log pipelines can audit the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LanguageProvenance {
    /// The LLM was confident about the query language.
    LlmConfident,
    /// Confidence was low; assistant prose falls back to the UI preference.
    UiLanguageLowConfidence,
    /// Provider language equals the detected query language.
    QueryLanguagePolicy,
    /// Query language is not provider-supported; English is sent instead.
    QueryLanguageFallbackUnsupported,
}

impl LanguageProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmConfident => "llm_confident",
            Self::UiLanguageLowConfidence => "ui_language_low_confidence",
            Self::QueryLanguagePolicy => "query_language_policy",
            Self::QueryLanguageFallbackUnsupported => "query_language_fallback_unsupported",
        }
    }
}

/// The four languages of one request plus the provenance of each decision.
///
/// Invariant: `search_language` is a function of `query_language` and the
/// provider allow-list only. It is never derived from the UI preference or
/// the assistant language, and it is the only field that may appear in
/// provider cache keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LanguageContext {
    pub ui_language: Language,
    pub query_language: Language,
    pub query_language_confidence: f64,
    pub assistant_language: Language,
    pub assistant_provenance: LanguageProvenance,
    pub search_language: Language,
    pub search_provenance: LanguageProvenance,
}
