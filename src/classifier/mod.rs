//! Query intent classification.
//!
//! Two independent pure passes composed into one result: a **domain**
//! pass that recognizes fixed surface patterns to pick the routing
//! handler, and a **style** pass that classifies the response shape the
//! user needs. Entity extraction runs alongside and normalizes
//! file/folder names before anything downstream sees them.
//!
//! `classify` never fails outward: if the work cannot complete within
//! the configured deadline, the caller receives the low-confidence
//! content-QA default so the pipeline always has something to route on.

mod domain;
mod entities;
mod style;

pub use domain::{detect_domain, DomainDetection};
pub use entities::{extract_entities, normalize_name};
pub use style::{detect_style, StyleDetection};

use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{ConversationTurn, Domain, IntentClassification, Role, HISTORY_WINDOW};

/// Classify a query into domain, style, and entities.
///
/// The passes are deterministic pattern ladders; history is consulted
/// only to carry a content-QA domain across short follow-ups ("and for
/// Q2?") that have no surface signal of their own.
pub fn classify(query: &str, history: &[ConversationTurn]) -> IntentClassification {
    let domain_pass = detect_domain(query);
    let style_pass = detect_style(query);
    let entities = extract_entities(query);

    let mut domain = domain_pass.domain;
    let mut reasoning = format!(
        "domain: {}; style: {}",
        domain_pass.reasoning, style_pass.reasoning
    );

    // Short follow-up with no pattern of its own: stay on the content
    // path if the conversation was already there.
    if domain == Domain::ContentQa && query.split_whitespace().count() <= 4 && !history.is_empty()
    {
        let window = history.iter().rev().take(HISTORY_WINDOW);
        let mut in_content_thread = false;
        for turn in window {
            if turn.role == Role::User {
                in_content_thread = detect_domain(&turn.text).domain == Domain::ContentQa;
                break;
            }
        }
        if in_content_thread {
            domain = Domain::ContentQa;
            reasoning.push_str("; short follow-up in a content thread");
        }
    }

    // Both passes are heuristic; the composite confidence is the weaker
    // of the two so downstream consumers do not over-trust a half match.
    let confidence = domain_pass.confidence.min(style_pass.confidence);

    debug!(
        domain = ?domain,
        style = ?style_pass.style,
        confidence,
        "classified query"
    );

    IntentClassification {
        domain,
        style: style_pass.style,
        confidence,
        entities,
        reasoning,
    }
}

/// Classify with a hard deadline.
///
/// The local passes are fast, but the deadline guards the contract for
/// configurations that delegate classification to a remote backend: on
/// expiry the default classification is returned and the timeout is
/// logged, never surfaced.
pub async fn classify_with_deadline(
    query: &str,
    history: &[ConversationTurn],
    timeout: Duration,
) -> IntentClassification {
    let query = query.to_string();
    let history = history.to_vec();
    let work = tokio::task::spawn_blocking(move || classify(&query, &history));

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(classification)) => classification,
        Ok(Err(join_err)) => {
            warn!(error = %join_err, "classification task failed, using fallback");
            IntentClassification::fallback()
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "classification timed out, using fallback");
            IntentClassification::fallback()
        }
    }
}
