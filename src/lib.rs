//! # Docent
//!
//! Confidence-gated question answering over a private document collection.
//!
//! Docent combines intent understanding, semantic retrieval behind a
//! confidence gate, and generative answer synthesis — optionally
//! delivered as a progressive SSE stream — into one pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────┐   ┌───────────────────────────────┐
//! │ Classifier │──▶│ Router │──▶│ greeting / navigate / mentions │
//! │ domain+style│  └───┬────┘   │ list  (structured lookups)    │
//! └────────────┘      │        └───────────────────────────────┘
//!                     ▼ content
//!          ┌──────────────────────┐   ┌───────────┐   ┌───────────┐
//!          │ Retrieve + Gate      │──▶│ Aggregate │──▶│ Compose + │
//!          │ (threshold by intent)│   │ (dedup)   │   │ Generate  │
//!          └──────────────────────┘   └───────────┘   └─────┬─────┘
//!                     ▲                                      │
//!                 ┌───┴──────── Response Cache ◀─────────────┘
//! ```
//!
//! ## Control Flow
//!
//! 1. The **classifier** ([`classifier`]) runs two pure passes — routing
//!    domain and response style — plus entity extraction.
//! 2. The **router** ([`router`]) answers greetings, file-location,
//!    mentions, and listing queries from structured lookups with no
//!    retrieval or generation.
//! 3. Content questions run **retrieval** ([`retrieval`]) with an
//!    intent-dependent similarity threshold; if nothing clears the gate
//!    the pipeline short-circuits with a deterministic
//!    insufficient-evidence answer instead of generating.
//! 4. Surviving candidates are **aggregated** ([`aggregate`]) to at most
//!    one chunk per document, then **composed** ([`prompt`]) into a
//!    style-templated generation request.
//! 5. The **generator** ([`generate`]) answers in one call or as an
//!    ordered fragment stream ([`stream`]).
//! 6. The whole content path is memoized by the **response cache**
//!    ([`cache`]) with TTL expiry, an LRU bound, and a single-flight
//!    guard.
//!
//! ## Quick Start
//!
//! ```bash
//! docent classify "where is passport.pdf"
//! docent ask "what is the Q1 revenue?" --collection demos/collection.json
//! docent serve http                     # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`classifier`] | Domain/style classification and entity extraction |
//! | [`router`] | Domain dispatch and structured-lookup handlers |
//! | [`retrieval`] | Vector search and the confidence gate |
//! | [`aggregate`] | Source deduplication and ranking |
//! | [`prompt`] | Style templates and prompt composition |
//! | [`generate`] | Generation and embedding backends |
//! | [`stream`] | Streaming session state machine |
//! | [`cache`] | Response cache (TTL + LRU + single-flight) |
//! | [`adapters`] | External collaborator traits and reference impls |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`server`] | HTTP server |
//! | [`collection`] | Local collection loading for the CLI |

pub mod adapters;
pub mod aggregate;
pub mod cache;
pub mod classifier;
pub mod collection;
pub mod config;
pub mod error;
pub mod generate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod router;
pub mod server;
pub mod stream;
