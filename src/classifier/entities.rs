//! Entity extraction: slots pulled out of the query text.
//!
//! Filenames and folder names are normalized before being handed
//! downstream — extension stripped, `_`/`-` replaced with spaces,
//! whitespace collapsed — so "move koda_checklist.pdf to Reports folder"
//! yields filename "koda checklist" and folder "Reports".

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Entities;

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([\w][\w\-.]{0,80}\.(pdf|docx?|xlsx?|pptx?|txt|md|csv))\b").unwrap()
});

static FOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in|inside|under|to|from)\s+(?:the\s+)?([\w][\w \-]{0,60}?)\s+folder\b")
        .unwrap()
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]{1,120})"|'([^']{1,120})'"#).unwrap());

static MENTIONS_OF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:mentions?|occurrences?|references?)\s+(?:of|to)\s+(.{1,80})").unwrap()
});

static ABOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:about|regarding|related\s+to|concerning)\s+(.{1,80})").unwrap()
});

static CELL_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:([A-Za-z_][A-Za-z0-9_ ]{0,30})!)?([A-Z]{1,3}[0-9]{1,7}(?::[A-Z]{1,3}[0-9]{1,7})?)\b")
        .unwrap()
});

static SPREADSHEET_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(cells?|sheets?|columns?|rows?|formulas?|values?|sum|average|spreadsheets?)\b")
        .unwrap()
});

static DOC_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(pdfs?|spreadsheets?|presentations?|word\s+documents?|text\s+files?|images?)\b")
        .unwrap()
});

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwhere\s+(?:is|are|can\s+i\s+find)\s+(?:my\s+|the\s+)?(.{1,60}?)\s*[?.!]?\s*$")
        .unwrap()
});

/// Strip the extension and normalize separators/whitespace in a file or
/// folder name.
pub fn normalize_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let stem = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 && !ext.contains(' ') => stem,
        _ => trimmed,
    };
    stem.chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract all recognizable slots from the query text.
pub fn extract_entities(query: &str) -> Entities {
    let mut entities = Entities::default();

    if let Some(caps) = FILENAME_RE.captures(query) {
        entities.filename = Some(normalize_name(&caps[1]));
    }

    if let Some(caps) = FOLDER_RE.captures(query) {
        entities.folder_name = Some(caps[1].trim().to_string());
    }

    if let Some(caps) = QUOTED_RE.captures(query) {
        let phrase = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string());
        entities.search_phrase = phrase;
    } else if let Some(caps) = MENTIONS_OF_RE.captures(query) {
        let phrase = caps[1].trim().trim_end_matches(['?', '.', '!']).trim();
        if !phrase.is_empty() {
            entities.search_phrase = Some(phrase.to_string());
        }
    } else if let Some(caps) = ABOUT_RE.captures(query) {
        // Topical phrase ("documents about X") — used by the semantic
        // listing path.
        let phrase = caps[1].trim().trim_end_matches(['?', '.', '!']).trim();
        if !phrase.is_empty() {
            entities.search_phrase = Some(phrase.to_string());
        }
    }

    if let Some(caps) = CELL_REF_RE.captures(query) {
        // A bare token like "Q1" also matches the A1-style pattern, so a
        // plain reference only counts when the query carries spreadsheet
        // context; sheet-qualified and range references always count.
        let qualified = caps.get(1).is_some() || caps[2].contains(':');
        if qualified || SPREADSHEET_CONTEXT_RE.is_match(query) {
            let reference = match caps.get(1) {
                Some(sheet) => format!("{}!{}", sheet.as_str(), &caps[2]),
                None => caps[2].to_string(),
            };
            entities.cell_reference = Some(reference);
        }
    }

    if let Some(caps) = DOC_TYPE_RE.captures(query) {
        entities.document_type = Some(canonical_doc_type(&caps[1]));
    }

    if entities.filename.is_none() {
        if let Some(caps) = TARGET_RE.captures(query) {
            let target = caps[1].trim();
            if !target.is_empty() {
                entities.target_name = Some(normalize_name(target));
            }
        }
    }

    entities
}

fn canonical_doc_type(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.starts_with("pdf") {
        "pdf".to_string()
    } else if lower.starts_with("spreadsheet") {
        "xlsx".to_string()
    } else if lower.starts_with("presentation") {
        "pptx".to_string()
    } else if lower.starts_with("word") {
        "docx".to_string()
    } else if lower.starts_with("text") {
        "txt".to_string()
    } else {
        "image".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_normalized() {
        let e = extract_entities("move koda_checklist.pdf to Reports folder");
        assert_eq!(e.filename.as_deref(), Some("koda checklist"));
        assert_eq!(e.folder_name.as_deref(), Some("Reports"));
    }

    #[test]
    fn test_hyphen_and_case_preserved_in_words() {
        let e = extract_entities("open Q1-Revenue-Summary.xlsx");
        assert_eq!(e.filename.as_deref(), Some("Q1 Revenue Summary"));
    }

    #[test]
    fn test_quoted_search_phrase() {
        let e = extract_entities(r#"find all mentions of "force majeure""#);
        assert_eq!(e.search_phrase.as_deref(), Some("force majeure"));
    }

    #[test]
    fn test_unquoted_mentions_phrase() {
        let e = extract_entities("find all mentions of the merger agreement?");
        assert_eq!(e.search_phrase.as_deref(), Some("the merger agreement"));
    }

    #[test]
    fn test_cell_reference_plain() {
        let e = extract_entities("what is the value in B7?");
        assert_eq!(e.cell_reference.as_deref(), Some("B7"));
    }

    #[test]
    fn test_cell_reference_with_sheet_and_range() {
        let e = extract_entities("sum Sheet1!C2:D9 please");
        assert_eq!(e.cell_reference.as_deref(), Some("Sheet1!C2:D9"));
    }

    #[test]
    fn test_bare_quarter_label_not_a_cell_reference() {
        let e = extract_entities("what is the Q1 revenue?");
        assert!(e.cell_reference.is_none());
    }

    #[test]
    fn test_document_type() {
        let e = extract_entities("show me all my spreadsheets");
        assert_eq!(e.document_type.as_deref(), Some("xlsx"));
    }

    #[test]
    fn test_target_name_from_where_is() {
        let e = extract_entities("where is my insurance policy?");
        assert_eq!(e.target_name.as_deref(), Some("insurance policy"));
    }

    #[test]
    fn test_filename_takes_precedence_over_target() {
        let e = extract_entities("where is passport.pdf?");
        assert_eq!(e.filename.as_deref(), Some("passport"));
        assert!(e.target_name.is_none());
    }

    #[test]
    fn test_no_entities() {
        let e = extract_entities("what is the total revenue?");
        assert!(e.filename.is_none());
        assert!(e.folder_name.is_none());
        assert!(e.search_phrase.is_none());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("koda_checklist.pdf"), "koda checklist");
        assert_eq!(normalize_name("  a - b  "), "a b");
        assert_eq!(normalize_name("notes"), "notes");
    }
}
