//! Core data models used throughout Docent.
//!
//! These types represent the queries, classifications, retrieved evidence,
//! and answers that flow through the question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routing category of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Greeting,
    Navigation,
    MentionsSearch,
    ListMetadata,
    GeneralKnowledge,
    ContentQa,
}

impl Domain {
    /// List-style domains use the relaxed retrieval threshold: the user
    /// only needs filenames, not high-precision content matches.
    pub fn is_list_style(&self) -> bool {
        matches!(self, Domain::ListMetadata)
    }
}

/// Response-shape category of a content question — the need behind the
/// question, independent of the routing domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// Quick fact lookup ("what is the Q1 revenue?").
    FastAnswer,
    /// How-to / procedural ("how do I file an expense report?").
    Mastery,
    /// Comparison across alternatives ("compare plan A and plan B").
    Clarity,
    /// Judgment or recommendation ("should we renew this contract?").
    Insight,
    /// Exhaustive enumeration ("list every deadline in the contract").
    Control,
}

/// Requested answer length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnswerLength {
    Short,
    #[default]
    Medium,
    Summary,
    Long,
}

impl AnswerLength {
    /// Stable token used in cache fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerLength::Short => "short",
            AnswerLength::Medium => "medium",
            AnswerLength::Summary => "summary",
            AnswerLength::Long => "long",
        }
    }
}

/// Which documents a query is allowed to draw evidence from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    /// Search the user's whole collection.
    #[default]
    All,
    /// A single document is in focus (e.g. the file open in the viewer).
    Document(String),
    /// A set of explicitly attached documents.
    Documents(Vec<String>),
}

impl QueryScope {
    /// Scope identifiers, sorted so equivalent scopes compare equal
    /// regardless of attachment order.
    pub fn sorted_ids(&self) -> Vec<String> {
        match self {
            QueryScope::All => Vec::new(),
            QueryScope::Document(id) => vec![id.clone()],
            QueryScope::Documents(ids) => {
                let mut ids = ids.clone();
                ids.sort();
                ids.dedup();
                ids
            }
        }
    }

    pub fn is_single_document(&self) -> bool {
        matches!(self, QueryScope::Document(_))
    }
}

/// An incoming question. Immutable once received.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub user_id: String,
    pub conversation_id: String,
    pub scope: QueryScope,
    pub answer_length: AnswerLength,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            conversation_id: String::new(),
            scope: QueryScope::All,
            answer_length: AnswerLength::Medium,
            received_at: Utc::now(),
        }
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn of the conversation, supplied by the caller.
///
/// The pipeline consumes at most the [`HISTORY_WINDOW`] most recent turns
/// and never persists turns itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Maximum number of history turns the pipeline will look at.
pub const HISTORY_WINDOW: usize = 10;

/// Slots extracted from the query text during classification.
///
/// Filenames and folder names arrive extension-stripped and
/// whitespace-normalized (see `classifier::entities`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub filename: Option<String>,
    pub folder_name: Option<String>,
    pub target_name: Option<String>,
    pub search_phrase: Option<String>,
    pub cell_reference: Option<String>,
    pub document_type: Option<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.filename.is_none()
            && self.folder_name.is_none()
            && self.target_name.is_none()
            && self.search_phrase.is_none()
            && self.cell_reference.is_none()
            && self.document_type.is_none()
    }
}

/// Output of the query classifier: routing domain, response style, and
/// extracted entities, with a confidence in `[0, 1]`.
///
/// Computed fresh per query; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub domain: Domain,
    pub style: Style,
    pub confidence: f64,
    pub entities: Entities,
    /// Human-readable justification, for observability and tests.
    pub reasoning: String,
}

impl IntentClassification {
    /// The fallback used when classification cannot complete: route to
    /// content QA at half confidence so the pipeline always has
    /// something to dispatch on.
    pub fn fallback() -> Self {
        Self {
            domain: Domain::ContentQa,
            style: Style::FastAnswer,
            confidence: 0.5,
            entities: Entities::default(),
            reasoning: "classifier fallback".to_string(),
        }
    }
}

/// Where inside a document a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkLocation {
    #[default]
    None,
    Page(u32),
    Slide(u32),
    /// Spreadsheet cell or range reference, e.g. `"Sheet1!B7"`.
    Cell(String),
    Section(String),
}

impl ChunkLocation {
    /// Short tag used when serializing sources into prompts,
    /// e.g. `"page 4"` or `"cell Sheet1!B7"`.
    pub fn tag(&self) -> Option<String> {
        match self {
            ChunkLocation::None => None,
            ChunkLocation::Page(n) => Some(format!("page {}", n)),
            ChunkLocation::Slide(n) => Some(format!("slide {}", n)),
            ChunkLocation::Cell(r) => Some(format!("cell {}", r)),
            ChunkLocation::Section(s) => Some(format!("section {}", s)),
        }
    }
}

/// A chunk returned by the vector index. Read-only to the rest of the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub content: String,
    /// Cosine similarity to the query, in `[0, 1]`.
    pub similarity: f64,
    #[serde(default)]
    pub location: ChunkLocation,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Deduplicated, ranked, capped evidence for one answer.
///
/// Invariants: at most one chunk per `document_id` (highest similarity
/// wins), sorted by descending similarity, `confidence` is the mean
/// similarity of the kept chunks (0 when empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSet {
    pub chunks: Vec<RetrievedChunk>,
    pub confidence: f64,
}

impl SourceSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}

/// Sampling parameters handed to the generation backend. Derived
/// deterministically from style and answer length — see
/// [`resolve_params`](crate::prompt::resolve_params).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A fully composed generation request: instruction, serialized context,
/// history, and the question itself.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub system_instruction: String,
    pub context_block: String,
    pub history_block: String,
    pub query_text: String,
    pub params: GenerationParams,
}

/// The final answer returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: SourceSet,
    /// Opaque correlation handle for follow-up lookups.
    pub context_id: String,
    pub domain: Domain,
    pub confidence: f64,
    pub cached: bool,
}

impl AnswerResult {
    /// A deterministic low-confidence answer with no sources. Used for
    /// the insufficient-evidence short-circuit and the not-found paths —
    /// these are success values, not errors.
    pub fn without_sources(answer: impl Into<String>, domain: Domain) -> Self {
        Self {
            answer: answer.into(),
            sources: SourceSet::empty(),
            context_id: uuid::Uuid::new_v4().to_string(),
            domain,
            confidence: 0.0,
            cached: false,
        }
    }
}

/// Typed events emitted on a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Sent once when the session is confirmed.
    Connected { seq: u64, context_id: String },
    /// One produced text fragment, in strictly increasing `seq` order.
    Content { seq: u64, text: String },
    /// Transport keep-alive, independent of generation progress.
    Heartbeat { seq: u64 },
    /// Terminal success: full text plus aggregate metadata.
    Done {
        seq: u64,
        answer: String,
        sources: SourceSet,
        domain: Domain,
        confidence: f64,
    },
    /// Terminal failure: single user-visible message.
    Error { seq: u64, message: String },
}

impl StreamEvent {
    pub fn seq(&self) -> u64 {
        match self {
            StreamEvent::Connected { seq, .. }
            | StreamEvent::Content { seq, .. }
            | StreamEvent::Heartbeat { seq }
            | StreamEvent::Done { seq, .. }
            | StreamEvent::Error { seq, .. } => *seq,
        }
    }

    /// Event name used on the wire (SSE `event:` field).
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Content { .. } => "content",
            StreamEvent::Heartbeat { .. } => "heartbeat",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}
