//! Domain detection: which handler should answer this query.
//!
//! A deterministic pattern ladder, checked from the cheapest and most
//! specific surface form down to the content-QA fallback. Ties cannot
//! occur — the first matching rung wins, in the priority order
//! greeting > explicit file action > mentions > list/metadata >
//! general knowledge > content QA.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Domain;

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(hi|hiya|hello|hey|yo|howdy|good\s+(morning|afternoon|evening)|greetings|thanks|thank\s+you|bye|goodbye|see\s+you)\s*[!.?]*\s*$")
        .unwrap()
});

static NAVIGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(where\s+(is|are|can\s+i\s+find)|find|locate|open|show)\b.*\.(pdf|docx?|xlsx?|pptx?|txt|md|csv)\b")
        .unwrap()
});

static NAVIGATION_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(where\s+(is|are|did\s+i\s+(put|save|store))|locate|which\s+folder\s+(has|contains|is))\b")
        .unwrap()
});

static MENTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b((find|search\s+for|show)\s+(all\s+)?(mentions?|occurrences?|references?)\s+(of|to)|where\s+is\s+.{1,60}\s+mentioned|which\s+(documents?|files?)\s+(mention|contain|talk\s+about))\b"#)
        .unwrap()
});

static LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((show|list|display)\s+(me\s+)?(the\s+|all\s+|my\s+)?(files?|documents?|pdfs?|spreadsheets?|presentations?)|what\s+(files?|documents?)\s+(do\s+i\s+have|are\s+(in|there))|how\s+many\s+(files?|documents?))\b")
        .unwrap()
});

static FOLDER_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(files?|documents?|what('|\u{2019})?s)\s+(in|inside|under)\s+(the\s+)?.{1,60}\s+folder\b").unwrap()
});

static GENERAL_KNOWLEDGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(in\s+general|generally\s+speaking|define|what\s+does\s+.{1,40}\s+(mean|stand\s+for)|who\s+(invented|discovered|founded)|when\s+was\s+.{1,40}\s+(invented|founded|discovered))\b")
        .unwrap()
});

/// Outcome of the domain pass.
#[derive(Debug, Clone)]
pub struct DomainDetection {
    pub domain: Domain,
    pub confidence: f64,
    pub reasoning: &'static str,
}

/// Detect the routing domain for a query.
///
/// Runs the pattern ladder top to bottom and stops at the first match;
/// queries matching nothing fall back to content QA at moderate
/// confidence.
pub fn detect_domain(query: &str) -> DomainDetection {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return DomainDetection {
            domain: Domain::ContentQa,
            confidence: 0.5,
            reasoning: "empty query, content-QA fallback",
        };
    }

    if GREETING_RE.is_match(trimmed) {
        return DomainDetection {
            domain: Domain::Greeting,
            confidence: 0.98,
            reasoning: "bare greeting/closing phrase",
        };
    }

    if NAVIGATION_RE.is_match(trimmed) {
        return DomainDetection {
            domain: Domain::Navigation,
            confidence: 0.95,
            reasoning: "file action naming an explicit filename",
        };
    }

    if MENTIONS_RE.is_match(trimmed) {
        return DomainDetection {
            domain: Domain::MentionsSearch,
            confidence: 0.9,
            reasoning: "phrase-occurrence search request",
        };
    }

    if LIST_RE.is_match(trimmed) || FOLDER_LIST_RE.is_match(trimmed) {
        return DomainDetection {
            domain: Domain::ListMetadata,
            confidence: 0.9,
            reasoning: "file/folder listing request",
        };
    }

    if NAVIGATION_PHRASE_RE.is_match(trimmed) {
        return DomainDetection {
            domain: Domain::Navigation,
            confidence: 0.8,
            reasoning: "location question without explicit filename",
        };
    }

    if GENERAL_KNOWLEDGE_RE.is_match(trimmed) {
        return DomainDetection {
            domain: Domain::GeneralKnowledge,
            confidence: 0.75,
            reasoning: "general-knowledge marker, no document context needed",
        };
    }

    DomainDetection {
        domain: Domain::ContentQa,
        confidence: 0.7,
        reasoning: "no surface pattern matched, content-QA fallback",
    }
}
