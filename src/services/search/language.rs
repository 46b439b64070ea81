//! Language context resolution
//!
//! Pure computation of the four request languages. The provider-facing
//! language is derived from the detected query language and the provider
//! allow-list alone; the UI preference only ever influences assistant
//! prose, and the validator at the bottom makes the separation checkable.

use crate::models::{
    ASSISTANT_LANGUAGE_CONFIDENCE, Language, LanguageContext, LanguageProvenance,
    PROVIDER_SUPPORTED_LANGUAGES, ProviderLanguagePolicy,
};

/// Inputs the resolver needs beyond the intent stage's output.
#[derive(Debug, Clone)]
pub struct LanguagePolicy {
    pub provider_supported: Vec<Language>,
    pub policy: ProviderLanguagePolicy,
}

impl Default for LanguagePolicy {
    fn default() -> Self {
        Self {
            provider_supported: PROVIDER_SUPPORTED_LANGUAGES.to_vec(),
            policy: ProviderLanguagePolicy::QueryLanguage,
        }
    }
}

/// Default provider language per region, used only under the legacy
/// rollback policy.
fn region_default_language(region_code: Option<&str>) -> Language {
    match region_code {
        Some("IL") => Language::He,
        Some("FR") | Some("BE") | Some("CH") => Language::Fr,
        Some("ES") | Some("MX") | Some("AR") => Language::Es,
        Some("RU") => Language::Ru,
        Some("SA") | Some("AE") | Some("EG") | Some("MA") => Language::Ar,
        _ => Language::En,
    }
}

/// Compute the language context for one request.
pub fn resolve(
    ui_language: Language,
    _query_text: &str,
    region_code: Option<&str>,
    intent_language: Language,
    intent_language_confidence: f64,
    policy: &LanguagePolicy,
) -> LanguageContext {
    // Assistant prose follows the detected query language only when the
    // detection was confident.
    let (assistant_language, assistant_provenance) =
        if intent_language_confidence >= ASSISTANT_LANGUAGE_CONFIDENCE {
            (intent_language, LanguageProvenance::LlmConfident)
        } else {
            (ui_language, LanguageProvenance::UiLanguageLowConfidence)
        };

    // The provider language is a function of the query language and the
    // allow-list. Nothing UI- or assistant-derived may flow in here.
    let (search_language, search_provenance) = match policy.policy {
        ProviderLanguagePolicy::QueryLanguage => {
            if policy.provider_supported.contains(&intent_language) {
                (intent_language, LanguageProvenance::QueryLanguagePolicy)
            } else {
                (Language::En, LanguageProvenance::QueryLanguageFallbackUnsupported)
            }
        }
        ProviderLanguagePolicy::RegionDefault => {
            (region_default_language(region_code), LanguageProvenance::QueryLanguagePolicy)
        }
    };

    let context = LanguageContext {
        ui_language,
        query_language: intent_language,
        query_language_confidence: intent_language_confidence,
        assistant_language,
        assistant_provenance,
        search_language,
        search_provenance,
    };

    tracing::info!(
        "language_context_resolved ui={} query={} (conf {:.2}) assistant={} ({}) search={} ({})",
        context.ui_language,
        context.query_language,
        context.query_language_confidence,
        context.assistant_language,
        context.assistant_provenance.as_str(),
        context.search_language,
        context.search_provenance.as_str(),
    );

    context
}

/// Reject contexts whose provider language was derived from anything other
/// than the query language. Run on every resolved context before it reaches
/// a mapper.
pub fn validate(context: &LanguageContext) -> Result<(), String> {
    match context.search_provenance {
        LanguageProvenance::QueryLanguagePolicy
        | LanguageProvenance::QueryLanguageFallbackUnsupported => Ok(()),
        other => Err(format!(
            "search language provenance '{}' is not query-derived",
            other.as_str()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LanguagePolicy {
        LanguagePolicy::default()
    }

    #[test]
    fn confident_detection_drives_assistant_language() {
        let ctx = resolve(Language::En, "מסעדות", Some("IL"), Language::He, 0.92, &policy());
        assert_eq!(ctx.assistant_language, Language::He);
        assert_eq!(ctx.assistant_provenance, LanguageProvenance::LlmConfident);
        assert_eq!(ctx.search_language, Language::He);
    }

    #[test]
    fn low_confidence_falls_back_to_ui_for_assistant_only() {
        let ctx = resolve(Language::He, "pizza?", Some("IL"), Language::En, 0.5, &policy());
        assert_eq!(ctx.assistant_language, Language::He);
        assert_eq!(ctx.assistant_provenance, LanguageProvenance::UiLanguageLowConfidence);
        // Provider language still follows the query language.
        assert_eq!(ctx.search_language, Language::En);
        assert_eq!(ctx.search_provenance, LanguageProvenance::QueryLanguagePolicy);
    }

    #[test]
    fn unsupported_query_language_falls_back_to_english() {
        let restricted = LanguagePolicy {
            provider_supported: vec![Language::En, Language::He],
            policy: ProviderLanguagePolicy::QueryLanguage,
        };
        let ctx = resolve(Language::En, "restaurants", None, Language::Fr, 0.9, &restricted);
        assert_eq!(ctx.search_language, Language::En);
        assert_eq!(
            ctx.search_provenance,
            LanguageProvenance::QueryLanguageFallbackUnsupported
        );
        // Assistant prose still follows the confident detection.
        assert_eq!(ctx.assistant_language, Language::Fr);
    }

    #[test]
    fn search_language_ignores_ui_language() {
        let a = resolve(Language::He, "pizza", Some("IL"), Language::En, 0.9, &policy());
        let b = resolve(Language::En, "pizza", Some("IL"), Language::En, 0.9, &policy());
        assert_eq!(a.search_language, b.search_language);
        assert_eq!(a.search_provenance, b.search_provenance);
    }

    #[test]
    fn search_language_ignores_assistant_fallback() {
        // Same query language at different confidences: assistant language
        // flips, search language must not.
        let confident = resolve(Language::He, "pizza", None, Language::En, 0.95, &policy());
        let unsure = resolve(Language::He, "pizza", None, Language::En, 0.3, &policy());
        assert_ne!(confident.assistant_language, unsure.assistant_language);
        assert_eq!(confident.search_language, unsure.search_language);
    }

    #[test]
    fn validator_accepts_query_derived_only() {
        let good = resolve(Language::En, "pizza", None, Language::En, 0.9, &policy());
        assert!(validate(&good).is_ok());

        let mut bad = good.clone();
        bad.search_provenance = LanguageProvenance::UiLanguageLowConfidence;
        assert!(validate(&bad).is_err());
    }

    #[test]
    fn region_default_policy_is_region_driven() {
        let legacy = LanguagePolicy {
            provider_supported: PROVIDER_SUPPORTED_LANGUAGES.to_vec(),
            policy: ProviderLanguagePolicy::RegionDefault,
        };
        let ctx = resolve(Language::En, "pizza", Some("FR"), Language::En, 0.9, &legacy);
        assert_eq!(ctx.search_language, Language::Fr);
    }
}
