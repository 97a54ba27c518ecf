//! Style detection: what shape of answer the user needs.
//!
//! Classifies the psychological need behind a content question — quick
//! fact, how-to, comparison, judgment, or exhaustive list — independent
//! of the routing domain. Two-tier scoring per style: keyword hits plus
//! stronger phrase matches, highest score wins, deterministic tie-break
//! in declaration order.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Style;

static MASTERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(how\s+(do|can|should|would)\s+i|how\s+to|steps?|procedure|process|instructions?|set\s+up|configure)\b")
        .unwrap()
});

static MASTERY_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(walk\s+me\s+through|step\s+by\s+step|what\s+is\s+the\s+process\s+for)")
        .unwrap()
});

static CLARITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(compare|comparison|versus|vs\.?|difference|differences|better|worse|pros\s+and\s+cons|trade.?offs?)\b")
        .unwrap()
});

static CLARITY_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(difference\s+between|compared?\s+(to|with)|which\s+(one\s+)?is\s+(better|cheaper|faster))")
        .unwrap()
});

static INSIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(should\s+(i|we)|recommend|recommendation|advice|worth|risks?|implications?|do\s+you\s+think|assessment|evaluate)\b")
        .unwrap()
});

static INSIGHT_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(is\s+it\s+(worth|wise|a\s+good\s+idea)|what\s+are\s+the\s+(risks|implications)|your\s+(take|opinion|assessment))")
        .unwrap()
});

static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(all|every|each|complete|full|entire|exhaustive|enumerate)\b").unwrap()
});

static CONTROL_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(list\s+(all|every|each)|all\s+(the\s+)?(deadlines?|dates?|names?|amounts?|clauses?|items?)|don't\s+(miss|leave\s+out)\s+any)")
        .unwrap()
});

/// Outcome of the style pass.
#[derive(Debug, Clone)]
pub struct StyleDetection {
    pub style: Style,
    pub confidence: f64,
    pub reasoning: &'static str,
}

fn score(keyword: &Regex, phrase: &Regex, query: &str) -> f64 {
    let mut s = 0.0;
    if keyword.is_match(query) {
        s += 10.0;
    }
    if phrase.is_match(query) {
        s += 15.0;
    }
    s
}

/// Detect the response style for a content question.
///
/// Falls back to [`Style::FastAnswer`] when no shape signal is present —
/// a plain fact lookup is the common case.
pub fn detect_style(query: &str) -> StyleDetection {
    let candidates = [
        (
            Style::Mastery,
            score(&MASTERY_RE, &MASTERY_PHRASE_RE, query),
            "procedural phrasing",
        ),
        (
            Style::Clarity,
            score(&CLARITY_RE, &CLARITY_PHRASE_RE, query),
            "comparison phrasing",
        ),
        (
            Style::Insight,
            score(&INSIGHT_RE, &INSIGHT_PHRASE_RE, query),
            "judgment/recommendation phrasing",
        ),
        (
            Style::Control,
            score(&CONTROL_RE, &CONTROL_PHRASE_RE, query),
            "exhaustive-enumeration phrasing",
        ),
    ];

    let best = candidates
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    match best {
        Some(&(style, s, reasoning)) if s > 0.0 => StyleDetection {
            style,
            confidence: if s >= 25.0 { 0.9 } else { 0.75 },
            reasoning,
        },
        _ => StyleDetection {
            style: Style::FastAnswer,
            confidence: 0.7,
            reasoning: "no shape signal, fast-answer default",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_answer_default() {
        assert_eq!(
            detect_style("what is the Q1 revenue?").style,
            Style::FastAnswer
        );
    }

    #[test]
    fn test_mastery() {
        assert_eq!(
            detect_style("how do I file an expense report?").style,
            Style::Mastery
        );
        assert_eq!(
            detect_style("walk me through the onboarding process").style,
            Style::Mastery
        );
    }

    #[test]
    fn test_clarity() {
        assert_eq!(
            detect_style("what is the difference between plan A and plan B?").style,
            Style::Clarity
        );
    }

    #[test]
    fn test_insight() {
        assert_eq!(
            detect_style("should we renew this contract?").style,
            Style::Insight
        );
    }

    #[test]
    fn test_control() {
        assert_eq!(
            detect_style("list all the deadlines in the contract").style,
            Style::Control
        );
    }

    #[test]
    fn test_phrase_match_beats_keyword_only() {
        // "all" alone scores Control at 10; a how-to phrase scores 25.
        let d = detect_style("walk me through all the steps");
        assert_eq!(d.style, Style::Mastery);
    }

    #[test]
    fn test_deterministic() {
        let a = detect_style("compare the two proposals");
        let b = detect_style("compare the two proposals");
        assert_eq!(a.style, b.style);
        assert_eq!(a.confidence, b.confidence);
    }
}
