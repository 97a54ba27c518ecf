//! Prompt composition.
//!
//! Builds one instruction block per response style (a closed set of five
//! templates), serializes each source chunk with its document name and
//! location tag so the generator can attribute claims, and derives
//! generation parameters deterministically from (style, answer length).

use crate::models::{
    AnswerLength, ChunkLocation, ConversationTurn, GenerationParams, PromptSpec, Role, SourceSet,
    Style, HISTORY_WINDOW,
};

/// Base instruction shared by every style. Loaded once into the binary;
/// never re-derived per request.
const BASE_INSTRUCTION: &str = "You are an assistant answering questions about the user's \
private document collection. Ground every claim in the provided sources and cite them by \
document name. If the sources do not contain the answer, say so plainly instead of guessing.";

/// Spreadsheet addendum, applied when any kept source carries a cell
/// location. Mirrors the analysis guidance the product ships for
/// spreadsheet-heavy collections.
const SPREADSHEET_ADDENDUM: &str = "Some sources come from spreadsheets. When a formula \
appears, explain what it calculates step by step. When analyzing tabular data, compute \
totals, averages, and differences explicitly, and give quantitative context (percentages, \
growth rates) rather than vague comparisons.";

/// Per-style answer-shape instruction.
fn style_instruction(style: Style) -> &'static str {
    match style {
        Style::FastAnswer => {
            "Answer directly in one or two sentences, leading with the fact the user asked \
             for. Skip preamble."
        }
        Style::Mastery => {
            "Answer as a numbered sequence of concrete steps the user can follow. Note \
             prerequisites before step one and pitfalls next to the step they affect."
        }
        Style::Clarity => {
            "Answer as a comparison: a short verdict first, then a compact table or \
             side-by-side bullets contrasting the options on the dimensions that matter."
        }
        Style::Insight => {
            "Answer with a clear recommendation and the reasoning behind it: key factors as \
             bullets, trade-offs acknowledged, and what would change the recommendation."
        }
        Style::Control => {
            "Answer with a complete enumeration. List every matching item from the sources, \
             one per line, and state the total count. Do not summarize or omit entries."
        }
    }
}

/// Derive sampling parameters from style and requested length.
///
/// The mapping is the contract: fact-lookup styles run cold, judgment
/// styles run warmer, and exhaustive/insight styles get the larger token
/// budget for a given length. The numbers themselves are illustrative
/// defaults.
pub fn resolve_params(style: Style, length: AnswerLength) -> GenerationParams {
    let temperature = match style {
        Style::FastAnswer | Style::Control => 0.2,
        Style::Mastery | Style::Clarity => 0.4,
        Style::Insight => 0.6,
    };

    let base_tokens: u32 = match length {
        AnswerLength::Short => 256,
        AnswerLength::Medium => 640,
        AnswerLength::Summary => 1024,
        AnswerLength::Long => 2048,
    };

    // Exhaustive and judgment answers need headroom beyond the length tier.
    let max_tokens = match style {
        Style::Control | Style::Insight => base_tokens.saturating_mul(3) / 2,
        _ => base_tokens,
    };

    GenerationParams {
        max_tokens,
        temperature,
    }
}

/// Serialize one chunk as a source block the generator can cite.
fn serialize_chunk(index: usize, chunk: &crate::models::RetrievedChunk) -> String {
    let tag = match chunk.location.tag() {
        Some(tag) => format!("[{}, {}]", chunk.document_name, tag),
        None => format!("[{}]", chunk.document_name),
    };
    format!("Source {} {}:\n{}", index + 1, tag, chunk.content.trim())
}

/// Serialize the conversation window, oldest first, capped at
/// [`HISTORY_WINDOW`] turns.
fn serialize_history(history: &[ConversationTurn]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history[start..]
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, turn.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compose the full generation request for a content answer.
pub fn compose(
    query_text: &str,
    sources: &SourceSet,
    style: Style,
    length: AnswerLength,
    history: &[ConversationTurn],
) -> PromptSpec {
    let has_spreadsheet_source = sources
        .chunks
        .iter()
        .any(|c| matches!(c.location, ChunkLocation::Cell(_)));

    let mut system_instruction =
        format!("{}\n\n{}", BASE_INSTRUCTION, style_instruction(style));
    if has_spreadsheet_source {
        system_instruction.push_str("\n\n");
        system_instruction.push_str(SPREADSHEET_ADDENDUM);
    }

    let context_block = sources
        .chunks
        .iter()
        .enumerate()
        .map(|(i, c)| serialize_chunk(i, c))
        .collect::<Vec<_>>()
        .join("\n\n");

    PromptSpec {
        system_instruction,
        context_block,
        history_block: serialize_history(history),
        query_text: query_text.to_string(),
        params: resolve_params(style, length),
    }
}

/// Compose a request for a general-knowledge answer: no retrieved
/// context, same style shaping.
pub fn compose_general(
    query_text: &str,
    style: Style,
    length: AnswerLength,
    history: &[ConversationTurn],
) -> PromptSpec {
    PromptSpec {
        system_instruction: format!(
            "You are a helpful assistant. Answer from general knowledge; the user's \
             documents are not relevant to this question.\n\n{}",
            style_instruction(style)
        ),
        context_block: String::new(),
        history_block: serialize_history(history),
        query_text: query_text.to_string(),
        params: resolve_params(style, length),
    }
}
