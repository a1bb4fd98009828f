//! Question routing: help, coaching, or the full pipeline.
//!
//! This gate is deliberately cheap and local — substring matching against
//! fixed vocabularies, no LLM or search calls — so out-of-scope questions
//! never burn pipeline budget and get actionable guidance instead of a
//! degraded answer.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::Coaching;

/// Where a question goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Static help payload; no pipeline work
    Help(Coaching),

    /// Coach the user toward an answerable question; no pipeline work
    Coaching {
        coaching: Coaching,
        brand_guess: String,
    },

    /// In-scope metric-change question
    Pipeline,
}

const HELP_PHRASES: &[&str] = &[
    "what do you do",
    "what can you do",
    "how do i use",
    "capabilities",
    "supported metrics",
    "what metrics",
];

const METRIC_WORDS: &[&str] = &[
    "salience",
    "awareness",
    "consideration",
    "preference",
    "intent",
    "nps",
    "share of voice",
];

const CHANGE_WORDS: &[&str] = &[
    "increased",
    "decreased",
    "fell",
    "rose",
    "down",
    "up",
    "drop",
    "gain",
    "change",
];

/// Decide how to handle a question, in priority order: help, then
/// coaching, then the pipeline.
pub fn classify(question: &str) -> Route {
    if is_help_question(question) {
        return Route::Help(help_payload());
    }

    if !looks_like_metric_change(question) {
        let brand_guess = guess_brand(question).unwrap_or_else(|| "unknown".to_string());
        let coaching = coaching_payload(&brand_guess);
        return Route::Coaching {
            coaching,
            brand_guess,
        };
    }

    Route::Pipeline
}

/// Help command prefix or a fixed natural-language help phrase
pub fn is_help_question(question: &str) -> bool {
    let q = question.trim().to_lowercase();
    if q.is_empty() {
        return false;
    }

    let first_word = q.split_whitespace().next().unwrap_or("");
    if first_word == "help" || first_word == "/help" {
        return true;
    }

    HELP_PHRASES.iter().any(|phrase| q.contains(phrase))
}

/// A question is in scope when it names both a metric-family term and a
/// change/direction term.
pub fn looks_like_metric_change(question: &str) -> bool {
    let q = question.to_lowercase();
    METRIC_WORDS.iter().any(|w| q.contains(w)) && CHANGE_WORDS.iter().any(|w| q.contains(w))
}

/// Best-effort brand guess: first capitalized word run, lowercased
pub fn guess_brand(question: &str) -> Option<String> {
    static BRAND_RE: OnceLock<Regex> = OnceLock::new();
    let re = BRAND_RE
        .get_or_init(|| Regex::new(r"\b([A-Z][A-Za-z0-9&\- ]{1,30})\b").expect("valid regex"));

    re.captures(question)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

fn help_payload() -> Coaching {
    Coaching {
        kind: "help".to_string(),
        message: concat!(
            "I'm a hypothesis-driven research assistant. I'm best at explaining ",
            "why a brand metric changed by finding validating web evidence with ",
            "citations. Right now I work best with questions about salience / ",
            "mental availability. For best results include: brand, metric, ",
            "direction (up/down), and a time period (and optionally a region)."
        )
        .to_string(),
        supported_metrics: vec!["salience".to_string()],
        examples: vec![
            "Salience fell by 6 points in Q3 2025 for New Look — find external reasons with citations.".to_string(),
            "Salience increased in Q4 2025 for Nike in China — what external events could explain it? Provide citations.".to_string(),
        ],
        suggested_questions: vec![],
        need: vec![],
    }
}

fn coaching_payload(brand_hint: &str) -> Coaching {
    let brand = if brand_hint.is_empty() || brand_hint == "unknown" {
        "the brand"
    } else {
        brand_hint
    };

    Coaching {
        kind: "coaching".to_string(),
        message: concat!(
            "Your question is valid, but it doesn't map cleanly to the ",
            "metric-change research pipeline. To get the best results, pick a ",
            "timeframe and define what 'underperforming' means (revenue vs ",
            "market share vs awareness/salience)."
        )
        .to_string(),
        supported_metrics: vec![],
        examples: vec![],
        suggested_questions: vec![
            format!("Who are {brand}'s biggest competitors globally and in Asia/Europe/US? Provide citations."),
            format!("In 2024-2025, which regions is {brand} underperforming in (North America, China, EMEA) based on revenue growth/decline? Provide citations."),
            format!("Brand salience decreased for {brand} in China in Q3 2025 — find external reasons with citations."),
        ],
        need: vec![
            "timeframe".to_string(),
            "definition_of_underperforming".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_routes() {
        assert!(matches!(classify("help"), Route::Help(_)));
        assert!(matches!(classify("/help me"), Route::Help(_)));
        assert!(matches!(classify("What can you do?"), Route::Help(_)));

        if let Route::Help(coaching) = classify("help") {
            assert_eq!(coaching.kind, "help");
            assert_eq!(coaching.supported_metrics, vec!["salience"]);
        }
    }

    #[test]
    fn test_metric_change_detection() {
        assert!(looks_like_metric_change(
            "Salience fell by 6 points in Q3 2025 for New Look"
        ));
        assert!(!looks_like_metric_change("What is New Look's market cap?"));
        // Metric word without a direction word is not enough
        assert!(!looks_like_metric_change("Tell me about salience"));
    }

    #[test]
    fn test_out_of_scope_coaches_with_brand_guess() {
        match classify("What is New Look's market cap?") {
            Route::Coaching {
                coaching,
                brand_guess,
            } => {
                assert_eq!(coaching.kind, "coaching");
                assert!(coaching.need.contains(&"timeframe".to_string()));
                assert!(brand_guess.contains("new look"));
            }
            other => panic!("expected coaching, got {other:?}"),
        }
    }

    #[test]
    fn test_in_scope_question_routes_to_pipeline() {
        assert_eq!(
            classify("Salience fell by 6 points in Q3 2025 for New Look — find external reasons with citations."),
            Route::Pipeline
        );
    }

    #[test]
    fn test_brand_guess_from_lowercase_question() {
        assert_eq!(guess_brand("what about nothing here"), None);
    }
}
