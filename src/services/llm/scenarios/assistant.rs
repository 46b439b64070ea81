//! Assistant scenario
//!
//! Generates the short prose message delivered over the WebSocket channel
//! after the HTTP response is already out. Model output is validated
//! against a strict shape; any violation swaps in a deterministic template
//! in the required language, so the user always gets well-formed prose.

use serde::{Deserialize, Serialize};

use crate::models::{AssistantContext, AssistantPayload, Language};
use crate::services::llm::models::{LlmScenario, LlmScenarioRequest};

const MAX_SENTENCES: usize = 3;

const SYSTEM_PROMPT: &str = r#"You write one short message to a user of a restaurant-search service. Respond with a single JSON object:
{"message": "<at most 3 sentences>", "question": "<clarifying question or null>"}

Rules:
- Write in exactly the requested language.
- "question" only when the context asks you to clarify; otherwise null.
- The message must not contain a question mark unless "question" is set.
- No greetings, no emoji, no markdown.
- Never answer anything except the JSON object."#;

#[derive(Debug, Clone, Serialize)]
pub struct AssistantRequest {
    pub context: AssistantContext,
    pub language: Language,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_names: Vec<String>,
}

impl LlmScenarioRequest for AssistantRequest {
    fn scenario(&self) -> LlmScenario {
        LlmScenario::Assistant
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantResponse {
    pub message: String,
    #[serde(default)]
    pub question: Option<String>,
}

/// `blocksSearch` is a function of the context, never of the model.
pub fn blocks_search(context: AssistantContext) -> bool {
    matches!(context, AssistantContext::GateFail | AssistantContext::Clarify)
}

fn sentence_count(text: &str) -> usize {
    let terminals = text
        .chars()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .count();
    terminals.max(if text.trim().is_empty() { 0 } else { 1 })
}

/// Coarse script check. Latin-script languages are indistinguishable from
/// each other this way, so they only fail when the message is clearly in a
/// different script family.
fn matches_language(text: &str, language: Language) -> bool {
    let has_hebrew = text.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c));
    let has_arabic = text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c));
    let has_cyrillic = text.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c));
    match language {
        Language::He => has_hebrew,
        Language::Ar => has_arabic,
        Language::Ru => has_cyrillic,
        Language::En | Language::Es | Language::Fr => !has_hebrew && !has_arabic && !has_cyrillic,
    }
}

/// Validate a model response into the payload shape, or report why it
/// cannot be used.
pub fn validate(
    response: AssistantResponse,
    context: AssistantContext,
    language: Language,
) -> Result<AssistantPayload, String> {
    let message = response.message.trim().to_string();
    if message.is_empty() {
        return Err("empty message".to_string());
    }
    if sentence_count(&message) > MAX_SENTENCES {
        return Err(format!("message exceeds {MAX_SENTENCES} sentences"));
    }
    let question = response
        .question
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty() && q.to_lowercase() != "null");
    if message.contains('?') && question.is_none() {
        return Err("question mark without question field".to_string());
    }
    if question.is_some() && context != AssistantContext::Clarify {
        return Err("unexpected question for context".to_string());
    }
    if !matches_language(&message, language) {
        return Err("message not in requested language".to_string());
    }

    Ok(AssistantPayload {
        context,
        message,
        question,
        blocks_search: blocks_search(context),
        language,
    })
}

// ============================================================================
// Deterministic fallback templates
// ============================================================================

/// Template used whenever the model fails or its output fails validation.
pub fn fallback(context: AssistantContext, language: Language) -> AssistantPayload {
    use AssistantContext::*;
    use Language::*;

    let (message, question): (&str, Option<&str>) = match (context, language) {
        (GateFail, He) => ("נראה שזו לא בקשה לחיפוש מסעדות. אפשר לנסח מחדש עם סוג אוכל או מיקום.", None),
        (GateFail, En) => ("This doesn't look like a restaurant search. Try again with a food type or a location.", None),
        (GateFail, Es) => ("Esto no parece una búsqueda de restaurantes. Intenta de nuevo con un tipo de comida o una ubicación.", None),
        (GateFail, Ru) => ("Похоже, это не запрос на поиск ресторанов. Попробуйте снова, указав кухню или место.", None),
        (GateFail, Ar) => ("لا يبدو هذا بحثًا عن مطاعم. حاول مرة أخرى مع نوع طعام أو موقع.", None),
        (GateFail, Fr) => ("Cela ne ressemble pas à une recherche de restaurants. Réessayez avec un type de cuisine ou un lieu.", None),

        (Clarify, He) => ("כדי לדייק את החיפוש חסר לי פרט אחד.", Some("באיזה אזור לחפש?")),
        (Clarify, En) => ("I need one more detail to narrow the search.", Some("Which area should I search in?")),
        (Clarify, Es) => ("Necesito un detalle más para afinar la búsqueda.", Some("¿En qué zona busco?")),
        (Clarify, Ru) => ("Мне нужна ещё одна деталь, чтобы уточнить поиск.", Some("В каком районе искать?")),
        (Clarify, Ar) => ("أحتاج إلى تفصيل إضافي لتضييق البحث.", Some("في أي منطقة أبحث؟")),
        (Clarify, Fr) => ("Il me manque un détail pour affiner la recherche.", Some("Dans quel quartier chercher ?")),

        (Summary, He) => ("מצאתי כמה מקומות שמתאימים לבקשה. התוצאות מסודרות לפי התאמה.", None),
        (Summary, En) => ("I found a few places matching your request. Results are ordered by fit.", None),
        (Summary, Es) => ("Encontré algunos lugares que coinciden con tu búsqueda. Los resultados están ordenados por relevancia.", None),
        (Summary, Ru) => ("Я нашёл несколько подходящих мест. Результаты упорядочены по соответствию.", None),
        (Summary, Ar) => ("وجدت بعض الأماكن المطابقة لطلبك. النتائج مرتبة حسب الملاءمة.", None),
        (Summary, Fr) => ("J'ai trouvé quelques adresses correspondant à votre demande. Les résultats sont classés par pertinence.", None),

        (SearchFailed, He) => ("החיפוש נתקל בתקלה. כדאי לנסות שוב בעוד רגע.", None),
        (SearchFailed, En) => ("The search ran into a problem. Please try again in a moment.", None),
        (SearchFailed, Es) => ("La búsqueda tuvo un problema. Inténtalo de nuevo en un momento.", None),
        (SearchFailed, Ru) => ("При поиске возникла ошибка. Попробуйте ещё раз через минуту.", None),
        (SearchFailed, Ar) => ("واجه البحث مشكلة. حاول مرة أخرى بعد قليل.", None),
        (SearchFailed, Fr) => ("La recherche a rencontré un problème. Veuillez réessayer dans un instant.", None),

        (GenericQueryNarration, He) => ("חיפשתי מקומות מומלצים באזור שלך.", None),
        (GenericQueryNarration, En) => ("I looked for recommended places around you.", None),
        (GenericQueryNarration, Es) => ("Busqué lugares recomendados cerca de ti.", None),
        (GenericQueryNarration, Ru) => ("Я поискал рекомендованные места рядом с вами.", None),
        (GenericQueryNarration, Ar) => ("بحثت عن أماكن موصى بها بالقرب منك.", None),
        (GenericQueryNarration, Fr) => ("J'ai cherché des adresses recommandées autour de vous.", None),
    };

    AssistantPayload {
        context,
        message: message.to_string(),
        question: question.map(str::to_string),
        blocks_search: blocks_search(context),
        language,
    }
}
